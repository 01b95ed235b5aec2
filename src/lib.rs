//! Boot and firmware download control plane for modem coprocessors attached over shared memory.
//!
//! The application processor and the modem share a dual-port RAM window plus a pair of mailbox
//! registers. Before regular IPC traffic starts, the modem has to be fed its boot image and NV
//! calibration data frame by frame, and after a crash its memory can be uploaded back the same way.
//! This crate drives those handshakes; mapping the window and wiring the interrupt line is left to
//! the platform, which hands both in through [`Link`].
#![no_std]

extern crate alloc;

pub mod backend;
pub mod frame;
pub mod ioctl;
pub mod link;
pub mod map;
pub mod notify;
pub mod region;
pub mod timeout;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod mock;

pub use backend::{Backend, Capabilities, ExtOps, ModemType};
pub use link::LinkDevice;
pub use map::{BootMap, Direction, Layout};
pub use notify::Notifier;

/// Failures reported by the boot control plane.
///
/// None of these are retried internally; the caller decides whether to try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A bounded wait ran out of budget before the peer answered.
    #[error("timed out waiting for the modem")]
    Timeout,
    /// The peer answered with a different code than the one the handshake expects.
    #[error("unexpected response 0x{received:04x}, expected 0x{expected:04x}")]
    ProtocolMismatch { expected: u16, received: u16 },
    /// The bounce buffer for a transfer could not be allocated.
    #[error("out of memory for transfer buffer")]
    ResourceExhausted,
    /// Unknown request, malformed argument or a frame that does not fit.
    #[error("invalid request")]
    InvalidRequest,
    /// The selected backend does not provide this operation.
    #[error("operation not supported by this modem")]
    Unsupported,
    /// The layout places a field outside of the shared region.
    #[error("layout does not fit the shared region")]
    BadLayout,
}

impl Error {
    /// Negative errno as reported across the ioctl boundary.
    pub const fn errno(self) -> i32 {
        match self {
            Error::Timeout => -5,
            Error::ProtocolMismatch { .. } => -11,
            Error::ResourceExhausted => -12,
            Error::InvalidRequest | Error::BadLayout => -22,
            Error::Unsupported => -25,
        }
    }
}

/// Byte-addressable view of the shared boot window.
///
/// Every access has side effects on the peer and must reach the hardware in program order.
/// Implementations for real hardware live in [`region`].
pub trait SharedMemory {
    /// Size of the window in bytes.
    fn size(&self) -> usize;

    /// Copy `buf.len()` bytes starting at `offset` out of the window.
    fn read_bytes(&self, offset: usize, buf: &mut [u8]);

    /// Copy `data` into the window starting at `offset`.
    fn write_bytes(&mut self, offset: usize, data: &[u8]);

    fn read16(&self, offset: usize) -> u16 {
        let mut raw = [0u8; 2];
        self.read_bytes(offset, &mut raw);
        u16::from_le_bytes(raw)
    }

    fn write16(&mut self, offset: usize, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }
}

/// Representation of one attached modem: its shared window and its interrupt plumbing.
pub trait Link: SharedMemory {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Raise a notification code towards the modem.
    fn send_intr(&mut self, code: u16);

    /// Read the last notification code raised by the modem.
    fn recv_intr(&mut self) -> u16;

    /// Level of the modem-to-host notification line.
    ///
    /// The line is active low, `true` means a notification is waiting to be read.
    fn notification_pending(&self) -> bool;

    /// Unmask the modem-to-host notification interrupt.
    fn enable_irq(&mut self);

    /// Mask the modem-to-host notification interrupt without waiting for a running handler.
    fn disable_irq(&mut self);

    /// Drive the chip select of the shared-memory bridge active.
    ///
    /// Only bridges with a dedicated chip select need this.
    fn assert_chip_select(&mut self) {}
}

/// Payload class of a download frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Tag {
    /// Written once a transfer has finished.
    None = 0,
    /// Boot binary.
    Bin = 1,
    /// NV calibration data.
    Nv = 2,
}
