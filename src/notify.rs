//! Notification codes exchanged with the modem, and the state they drive.
//!
//! The modem signals protocol events by raising a 16-bit code on the notification line. Those
//! arrive in interrupt context, where the only thing allowed is to flip a [`Latch`] or to queue a
//! [`Continuation`] on the [`Notifier`]. The sequencer picks both up from its own context.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

/// Codes raised by the modem.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerCommand {
    /// Ready to receive a download, or ready to upload.
    Ready,
    /// Previous frame consumed, or a new upload frame is waiting.
    FrameAck,
    /// Execution of the downloaded image started.
    Booting,
}

impl PeerCommand {
    pub const fn code(self) -> u16 {
        match self {
            PeerCommand::Ready => 0x1234,
            PeerCommand::FrameAck => 0xDBAB,
            PeerCommand::Booting => 0xABCD,
        }
    }
}

impl TryFrom<u16> for PeerCommand {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0x1234 => Ok(PeerCommand::Ready),
            0xDBAB => Ok(PeerCommand::FrameAck),
            0xABCD => Ok(PeerCommand::Booting),
            other => Err(other),
        }
    }
}

/// Codes raised by the host.
pub mod host {
    /// A frame has been placed in the boot buffer, or an upload frame has been consumed.
    pub const FRAME_SENT: u16 = 0xDB12;
    /// Start executing the downloaded image.
    pub const START_EXECUTION: u16 = 0x4567;
    /// Begin uploading memory.
    pub const BEGIN_UPLOAD: u16 = 0xDEAD;
}

bitflags::bitflags! {
    /// Composite code announcing that the host finished its part of the boot.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct InitEnd: u16 {
        const CMD_INIT_END = 0x0002;
        const CMD = 0x0040;
        const VALID = 0x0080;
        const CP_AP_ANDROID = 0x0100;
        const CP_AIRPLANE_BOOT = 0x1000;
    }
}

/// Single-bit completion flag, set by the notification path and consumed by one waiter.
pub struct Latch(AtomicBool);

impl Latch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Deferred work queued by the notification path for the sequencer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Continuation {
    NextFrame,
}

/// At most one frame is outstanding; the extra slot absorbs a stray duplicate.
const CONTINUATION_DEPTH: usize = 2;

/// Handoff point between the notification path of one link and its sequencer.
pub struct Notifier {
    pub copy_start: Latch,
    pub boot_complete: Latch,
    pub boot_start_complete: Latch,
    pub udl_response: Latch,
    continuations: Channel<CriticalSectionRawMutex, Continuation, CONTINUATION_DEPTH>,
}

impl Notifier {
    pub const fn new() -> Self {
        Self {
            copy_start: Latch::new(),
            boot_complete: Latch::new(),
            boot_start_complete: Latch::new(),
            udl_response: Latch::new(),
            continuations: Channel::new(),
        }
    }

    /// Queue work for the sequencer; returns `false` when the queue is full.
    pub fn schedule(&self, continuation: Continuation) -> bool {
        self.continuations.try_send(continuation).is_ok()
    }

    /// Take the next queued continuation, if any.
    pub fn next_continuation(&self) -> Option<Continuation> {
        self.continuations.try_receive().ok()
    }

    /// Drop every queued continuation, returning how many were pending.
    pub fn drain_continuations(&self) -> usize {
        let mut dropped = 0;
        while self.next_continuation().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Mailbox response interrupt of bridges that answer boot frames through the mailbox.
    pub fn signal_udl_response(&self) {
        self.udl_response.set();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
