//! Download of the boot binary and the NV data.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, warn};

use crate::{
    Error, Link, Tag,
    frame::{self, Session, Step},
    ioctl,
    link::LinkDevice,
    map::Direction,
    notify::Continuation,
    timeout::{self, Deadline},
};

/// Wait for the modem to announce that it is ready to receive.
pub async fn prepare<L: Link, D: DelayNs>(ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
    ld.set_direction(Direction::Download);

    let notifier = ld.notifier;
    timeout::wait_for(&mut ld.delay, timeout::PREPARE, || notifier.copy_start.take())
        .await
        .inspect_err(|_| error!("ERR! modem never became ready for download"))
}

/// Copy in the ioctl argument and download it.
pub async fn load<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
    arg: &[u8],
    tag: Tag,
) -> Result<(), Error> {
    let (param, image) = ioctl::copy_in(arg)?;

    // NV downloads ignore the count anyway.
    let count = match tag {
        Tag::Nv => 1,
        _ => u16::try_from(param.count).map_err(|_| Error::InvalidRequest)?,
    };

    download(ld, &image, count, tag).await
}

/// Stream `image` through the boot buffer.
///
/// The first frame goes out right away; every following one is sent when the modem acknowledges
/// the previous. The whole transfer shares one time budget.
pub async fn download<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
    image: &[u8],
    count: u16,
    tag: Tag,
) -> Result<(), Error> {
    let stale = ld.notifier.drain_continuations();
    if stale > 0 {
        warn!("dropped {} stale frame acknowledgements", stale);
    }

    let mut session = Session::new(image, ld.boot_map.capacity, tag, count);
    frame::transmit(&mut ld.link, &ld.boot_map, session.frame(), session.params())?;

    let budget = match tag {
        Tag::Nv => timeout::NV_LOAD,
        _ => timeout::BINARY_LOAD,
    };
    let mut deadline = Deadline::new(budget);

    loop {
        while let Some(Continuation::NextFrame) = ld.notifier.next_continuation() {
            match session.advance() {
                Step::Complete => {
                    debug!("{}: {} bytes downloaded", ld.name(), session.progress().sent);
                    return Ok(());
                }
                Step::Next => {
                    frame::transmit(&mut ld.link, &ld.boot_map, session.frame(), session.params())?;
                }
            }
        }

        if let Err(e) = deadline.sleep(&mut ld.delay).await {
            let progress = session.progress();
            error!(
                "ERR! download stalled at {}/{} bytes after {} ms",
                progress.sent,
                progress.total,
                deadline.elapsed_ms()
            );
            return Err(e);
        }
    }
}
