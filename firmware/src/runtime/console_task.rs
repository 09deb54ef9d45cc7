use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};

use super::FirmwareHandle;
use crate::console::{ConsoleSession, MAX_LINE_LEN};

const CONSOLE_UART_BUFFER_SIZE: usize = MAX_LINE_LEN * 4;
const CONSOLE_UART_BAUD: u32 = 115_200;
const PROMPT: &[u8] = b"> ";

static mut UART_TX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];
static mut UART_RX_BUFFER: [u8; CONSOLE_UART_BUFFER_SIZE] = [0; CONSOLE_UART_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    handle: FirmwareHandle,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let mut uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize console UART")
    };

    let mut session = ConsoleSession::new(handle);
    let mut ingress = [0u8; MAX_LINE_LEN];
    let _ = uart.write_all(PROMPT).await;

    loop {
        let count = match uart.read(&mut ingress).await {
            Ok(count) => count,
            Err(_) => {
                defmt::warn!("console: UART read error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
        };

        for &byte in &ingress[..count] {
            let result = session.ingest(byte);
            let written = match result {
                Ok(None) => Ok(()),
                Ok(Some(reply)) => {
                    let mut written = Ok(());
                    for line in &reply {
                        written = write_line(&mut uart, line.as_bytes()).await;
                        if written.is_err() {
                            break;
                        }
                    }
                    match written {
                        Ok(()) => uart.write_all(PROMPT).await,
                        error => error,
                    }
                }
                Err(error) => {
                    let mut line = heapless::String::<32>::new();
                    let _ = core::fmt::write(&mut line, format_args!("{error}"));
                    write_line(&mut uart, line.as_bytes()).await
                }
            };

            if written.is_err() {
                defmt::warn!("console: UART write error");
            }
        }

        if uart.flush().await.is_err() {
            defmt::warn!("console: UART flush error");
        }
    }
}

async fn write_line<W: Write>(uart: &mut W, line: &[u8]) -> Result<(), W::Error> {
    uart.write_all(line).await?;
    uart.write_all(b"\r\n").await
}
