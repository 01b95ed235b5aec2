//! Handover from the downloaded image to normal operation.

use embedded_hal_async::delay::DelayNs;
use log::{error, info};

use crate::{
    Error, Link,
    link::LinkDevice,
    notify::{InitEnd, host},
    timeout,
};

/// Mask the host raises once the modem reported that it is up.
pub const INIT_END: InitEnd = InitEnd::VALID
    .union(InitEnd::CMD)
    .union(InitEnd::CP_AIRPLANE_BOOT)
    .union(InitEnd::CP_AP_ANDROID)
    .union(InitEnd::CMD_INIT_END);

/// Ask the modem to execute the downloaded image and wait for it to confirm.
pub async fn start<L: Link, D: DelayNs>(ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
    ld.link.send_intr(host::START_EXECUTION);

    let notifier = ld.notifier;
    timeout::wait_for(&mut ld.delay, timeout::BOOT_ACK, || {
        notifier.boot_complete.take()
    })
    .await
    .inspect_err(|_| error!("ERR! modem did not start execution"))
}

/// Wait for the modem to report that it is up.
pub async fn post_process<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
) -> Result<(), Error> {
    let notifier = ld.notifier;
    timeout::wait_for(&mut ld.delay, timeout::BOOT_POST_PROCESS, || {
        notifier.boot_start_complete.take()
    })
    .await
    .inspect_err(|_| error!("ERR! modem never reported it is up"))
}

/// The modem is up: release the post-processing wait and tell the modem the host is done.
pub fn start_handler<L: Link, D: DelayNs>(ld: &mut LinkDevice<'_, L, D>) {
    ld.notifier.boot_start_complete.set();

    info!("send 0x{:04X} (INIT_END)", INIT_END.bits());
    ld.link.send_intr(INIT_END.bits());
}
