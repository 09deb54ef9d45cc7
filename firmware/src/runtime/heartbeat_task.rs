use embassy_time::{Duration, Timer};

use crate::status;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn run() -> ! {
    loop {
        Timer::after(HEARTBEAT_PERIOD).await;

        let status = status::published();
        defmt::info!(
            "status: usecase={} mode=0x{:02x} votes={} ready={} retry={} fault={}",
            status.use_case.as_str(),
            status.mode.raw(),
            status.votes,
            status.device_ready,
            status.retry_pending,
            status.faulted
        );
    }
}
