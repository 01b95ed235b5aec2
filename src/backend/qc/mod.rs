//! Backend for Qualcomm MDM6600 and ESC6270 modems.
//!
//! These modems run the whole download through the boot buffer of the FMT channel: the host
//! streams frames into it and the modem acknowledges each one with a notification code. The
//! same buffer pair is used in the opposite direction to upload modem memory after a crash.

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::{
    Error, Link, Tag,
    backend::{CRASH_LOG_LEN, Capabilities, CrashLog, ExtOps},
    ioctl::Ioctl,
    link::LinkDevice,
    map::{self, Direction},
    notify::{Continuation, Notifier, PeerCommand},
};

pub mod boot;
pub mod download;
pub mod upload;

pub struct Qc;

impl ExtOps for Qc {
    fn capabilities(&self) -> Capabilities {
        Capabilities::DLOAD_CMD_HANDLER
            | Capabilities::CP_START_HANDLER
            | Capabilities::CRASH_LOG
            | Capabilities::IOCTL
    }

    fn init_boot_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        ld.set_direction(Direction::Download);
    }

    fn dload_cmd_handler(&self, notifier: &Notifier, code: u16) {
        match PeerCommand::try_from(code) {
            Ok(PeerCommand::Ready) => notifier.copy_start.set(),
            Ok(PeerCommand::FrameAck) => {
                if !notifier.schedule(Continuation::NextFrame) {
                    warn!("frame acknowledgement dropped, continuation queue full");
                }
            }
            Ok(PeerCommand::Booting) => {
                info!("booting Start");
                notifier.boot_complete.set();
            }
            Err(code) => error!("ERR! unknown command 0x{:04X}", code),
        }
    }

    fn cp_start_handler<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        boot::start_handler(ld);
    }

    fn crash_log<L: Link, D: DelayNs>(&self, ld: &LinkDevice<'_, L, D>) -> Option<CrashLog> {
        let rx = ld.layout.rx_buff as usize;
        if !map::fits(ld.link.size(), rx, CRASH_LOG_LEN) {
            error!("{}: ERR! crash log overruns the window", ld.name());
            return None;
        }

        let mut buf = [0u8; CRASH_LOG_LEN];
        ld.link.read_bytes(rx, &mut buf);
        let log = CrashLog::new(buf);

        info!("PHONE ERR MSG\t| {} Crash", ld.name());
        info!("PHONE ERR MSG\t| {}", log.as_str());

        Some(log)
    }

    async fn ioctl<L: Link, D: DelayNs>(
        &self,
        ld: &mut LinkDevice<'_, L, D>,
        cmd: u32,
        arg: &mut [u8],
    ) -> Result<usize, Error> {
        let Ok(request) = Ioctl::try_from(cmd) else {
            error!("{}: ERR! invalid cmd 0x{:08X}", ld.name(), cmd);
            return Err(Error::InvalidRequest);
        };

        let result = match request {
            Ioctl::PhonePowerOn => download::prepare(ld).await.map(|()| 0),
            Ioctl::PhoneImageLoad => download::load(ld, arg, Tag::Bin).await.map(|()| 0),
            Ioctl::NvDataLoad => download::load(ld, arg, Tag::Nv).await.map(|()| 0),
            Ioctl::PhoneBootStart => match boot::start(ld).await {
                Ok(()) => boot::post_process(ld).await.map(|()| 0),
                Err(e) => Err(e),
            },
            Ioctl::UploadStep1 => upload::step1(ld).await.map(|()| 0),
            Ioctl::UploadStep2 => {
                let result = upload::step2(ld, arg).await;
                if result.is_err() {
                    ld.link.enable_irq();
                }
                result
            }
        };

        if let Err(e) = &result {
            error!("{}: ERR! {:?} failed: {}", ld.name(), request, e);
        }

        result
    }
}
