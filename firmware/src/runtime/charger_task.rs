use super::FirmwareService;

#[embassy_executor::task]
pub async fn run(service: FirmwareService) -> ! {
    service.run().await
}
