//! Vendor-specific boot sequencing, selected once per modem.

use embedded_hal_async::delay::DelayNs;

use crate::{Error, Link, link::LinkDevice, notify::Notifier};

#[cfg(feature = "cbp")]
pub mod cbp;
#[cfg(feature = "qc")]
pub mod qc;

/// Modem models that may sit behind a shared-memory link.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemType {
    QcMdm6600,
    QcEsc6270,
    ViaCbp72,
    ViaCbp82,
}

bitflags::bitflags! {
    /// Optional operations a backend provides.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Capabilities: u8 {
        const INIT_DL_MAP = 1 << 0;
        const DLOAD_CMD_HANDLER = 1 << 1;
        const CP_START_HANDLER = 1 << 2;
        const CRASH_LOG = 1 << 3;
        const XMIT_BINARY = 1 << 4;
        const SETDL_MAGIC = 1 << 5;
        const IOCTL = 1 << 6;
    }
}

/// A boot frame handed over pre-framed by the caller.
#[derive(Clone, Copy, Debug)]
pub struct BootFrame<'a> {
    /// Request code to put in the mailbox, zero to send nothing.
    pub req: u16,
    /// Response code to wait for, zero to not wait.
    pub resp: u16,
    pub data: &'a [u8],
}

/// Size of the message a crashed modem leaves in its receive buffer.
pub const CRASH_LOG_LEN: usize = 150;

/// Last words of a crashed modem.
pub struct CrashLog {
    buf: [u8; CRASH_LOG_LEN],
}

impl CrashLog {
    pub(crate) const fn new(buf: [u8; CRASH_LOG_LEN]) -> Self {
        Self { buf }
    }

    /// The message up to its terminating NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CRASH_LOG_LEN);
        &self.buf[..end]
    }

    /// The message as text, or its valid UTF-8 prefix.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

/// Extension operations of one modem family.
///
/// Only [`ExtOps::capabilities`] and [`ExtOps::init_boot_map`] are mandatory. Everything else
/// defaults to doing nothing or to [`Error::Unsupported`], and is advertised through
/// [`Capabilities`].
#[allow(async_fn_in_trait)]
pub trait ExtOps {
    fn capabilities(&self) -> Capabilities;

    /// Lay out the boot maps for the initial, download, direction.
    fn init_boot_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>);

    /// Lay out the secondary download map.
    fn init_dl_map<L: Link, D: DelayNs>(&self, _ld: &mut LinkDevice<'_, L, D>) {}

    /// Interpret a code raised by the modem. Called from interrupt context.
    fn dload_cmd_handler(&self, _notifier: &Notifier, _code: u16) {}

    /// Acknowledge that the modem started and hand over to normal operation.
    fn cp_start_handler<L: Link, D: DelayNs>(&self, _ld: &mut LinkDevice<'_, L, D>) {}

    /// Extract and log the diagnostic message of a crashed modem.
    fn crash_log<L: Link, D: DelayNs>(&self, _ld: &LinkDevice<'_, L, D>) -> Option<CrashLog> {
        None
    }

    /// Transfer a single pre-framed unit, returning its length once the modem accepted it.
    async fn xmit_binary<L: Link, D: DelayNs>(
        &self,
        _ld: &mut LinkDevice<'_, L, D>,
        _frame: BootFrame<'_>,
    ) -> Result<usize, Error> {
        Err(Error::Unsupported)
    }

    /// Announce download mode to the modem.
    fn setdl_magic<L: Link, D: DelayNs>(&self, _ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Run a control request, returning the number of bytes written back into `arg`.
    async fn ioctl<L: Link, D: DelayNs>(
        &self,
        _ld: &mut LinkDevice<'_, L, D>,
        _cmd: u32,
        _arg: &mut [u8],
    ) -> Result<usize, Error> {
        Err(Error::Unsupported)
    }
}

/// Extension operation table entry, resolved once per modem and never changed afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Backend {
    #[cfg(feature = "qc")]
    Qc,
    #[cfg(feature = "cbp")]
    Cbp,
}

impl Backend {
    /// Table lookup, `None` when the family of `modem` is not compiled in or has no entry.
    pub const fn for_modem(modem: ModemType) -> Option<Self> {
        match modem {
            #[cfg(feature = "qc")]
            ModemType::QcMdm6600 | ModemType::QcEsc6270 => Some(Backend::Qc),
            #[cfg(feature = "cbp")]
            ModemType::ViaCbp82 => Some(Backend::Cbp),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $op:ident => $call:expr) => {
        match *$self {
            #[cfg(feature = "qc")]
            Backend::Qc => {
                let $op = qc::Qc;
                $call
            }
            #[cfg(feature = "cbp")]
            Backend::Cbp => {
                let $op = cbp::Cbp;
                $call
            }
        }
    };
}

impl ExtOps for Backend {
    fn capabilities(&self) -> Capabilities {
        dispatch!(self, op => op.capabilities())
    }

    fn init_boot_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        dispatch!(self, op => op.init_boot_map(ld))
    }

    fn init_dl_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        dispatch!(self, op => op.init_dl_map(ld))
    }

    fn dload_cmd_handler(&self, notifier: &Notifier, code: u16) {
        dispatch!(self, op => op.dload_cmd_handler(notifier, code))
    }

    fn cp_start_handler<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        dispatch!(self, op => op.cp_start_handler(ld))
    }

    fn crash_log<L: Link, D: DelayNs>(&self, ld: &LinkDevice<'_, L, D>) -> Option<CrashLog> {
        dispatch!(self, op => op.crash_log(ld))
    }

    async fn xmit_binary<L: Link, D: DelayNs>(
        &self,
        ld: &mut LinkDevice<'_, L, D>,
        frame: BootFrame<'_>,
    ) -> Result<usize, Error> {
        dispatch!(self, op => op.xmit_binary(ld, frame).await)
    }

    fn setdl_magic<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
        dispatch!(self, op => op.setdl_magic(ld))
    }

    async fn ioctl<L: Link, D: DelayNs>(
        &self,
        ld: &mut LinkDevice<'_, L, D>,
        cmd: u32,
        arg: &mut [u8],
    ) -> Result<usize, Error> {
        dispatch!(self, op => op.ioctl(ld, cmd, arg).await)
    }
}
