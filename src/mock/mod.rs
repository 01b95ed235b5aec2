//! Simulated modem on the far side of a RAM-backed shared window.

use std::{collections::VecDeque, vec, vec::Vec};

use embedded_hal_async::delay::DelayNs;

use crate::{
    Link, SharedMemory,
    backend::{Backend, ExtOps, ModemType},
    link::LinkDevice,
    map::{BootMap, Direction, Layout},
    notify::{Notifier, PeerCommand, host},
};

pub const REGION_SIZE: usize = 0x4000;

pub const LAYOUT: Layout = Layout {
    tx_buff: 0x0010,
    rx_buff: 0x1010,
    boot_size_offset: 0x0C10,
    boot_tag_offset: 0x0C12,
    boot_count_offset: 0x0C14,
    max_boot_frame_size: 1024,
    magic_ap2cp: 0x3F00,
    mbx_ap2cp: 0x3F04,
    mbx_cp2ap: 0x3F06,
};

/// A frame as seen in the boot buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub tag: u16,
    pub count: u16,
}

impl Frame {
    pub fn new(data: &[u8], tag: u16, count: u16) -> Self {
        Self {
            data: data.to_vec(),
            tag,
            count,
        }
    }
}

pub struct MockLink<'n> {
    pub mem: Vec<u8>,
    notifier: &'n Notifier,
    /// Every code raised towards the modem.
    pub raised: Vec<u16>,
    /// Download frames the modem found in the boot buffer.
    pub frames: Vec<Frame>,
    /// Acknowledge every download frame.
    pub ack_frames: bool,
    /// Acknowledge the start-execution request.
    pub ack_boot: bool,
    /// Raised by the modem before each frame acknowledgement.
    pub noise: Option<u16>,
    /// Frames the modem uploads once asked to.
    pub upload: VecDeque<Frame>,
    uploading: bool,
    /// Codes raised by the modem which the host did not read yet.
    pub pending: VecDeque<u16>,
    last_intr: u16,
    pub irq_enabled: bool,
    pub chip_selected: bool,
}

impl<'n> MockLink<'n> {
    pub fn new(notifier: &'n Notifier) -> Self {
        Self {
            mem: vec![0; REGION_SIZE],
            notifier,
            raised: Vec::new(),
            frames: Vec::new(),
            ack_frames: true,
            ack_boot: true,
            noise: None,
            upload: VecDeque::new(),
            uploading: false,
            pending: VecDeque::new(),
            last_intr: 0,
            irq_enabled: true,
            chip_selected: false,
        }
    }

    /// Deliver a code through the notification path, as the interrupt handler would.
    pub fn notify(&self, code: u16) {
        Backend::for_modem(ModemType::QcMdm6600)
            .unwrap()
            .dload_cmd_handler(self.notifier, code);
    }

    fn capture_download(&mut self) {
        let map = BootMap::new(&LAYOUT, Direction::Download);
        let size = self.read16(map.frame_size) as usize;
        let mut data = vec![0; size];
        self.read_bytes(map.buff, &mut data);

        let frame = Frame {
            data,
            tag: self.read16(map.tag),
            count: self.read16(map.count),
        };
        self.frames.push(frame);

        if let Some(code) = self.noise {
            self.notify(code);
        }
        if self.ack_frames {
            self.notify(PeerCommand::FrameAck.code());
        }
    }

    fn stage_upload(&mut self) {
        let Some(frame) = self.upload.pop_front() else {
            return;
        };
        let map = BootMap::new(&LAYOUT, Direction::Upload);

        self.write_bytes(map.buff, &frame.data);
        self.write16(map.frame_size, frame.data.len() as u16);
        self.write16(map.tag, frame.tag);
        self.write16(map.count, frame.count);
        self.pending.push_back(PeerCommand::FrameAck.code());
    }
}

impl SharedMemory for MockLink<'_> {
    fn size(&self) -> usize {
        self.mem.len()
    }

    fn read_bytes(&self, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.mem[offset..offset + buf.len()]);
    }

    fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        self.mem[offset..offset + data.len()].copy_from_slice(data);
    }
}

impl Link for MockLink<'_> {
    fn name(&self) -> &str {
        "mock"
    }

    fn send_intr(&mut self, code: u16) {
        self.raised.push(code);

        match code {
            host::FRAME_SENT if self.uploading => self.stage_upload(),
            host::FRAME_SENT => self.capture_download(),
            host::START_EXECUTION if self.ack_boot => self.notify(PeerCommand::Booting.code()),
            host::BEGIN_UPLOAD => {
                self.uploading = true;
                self.stage_upload();
            }
            _ => {}
        }
    }

    fn recv_intr(&mut self) -> u16 {
        if let Some(code) = self.pending.pop_front() {
            self.last_intr = code;
        }
        self.last_intr
    }

    fn notification_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn enable_irq(&mut self) {
        self.irq_enabled = true;
    }

    fn disable_irq(&mut self) {
        self.irq_enabled = false;
    }

    fn assert_chip_select(&mut self) {
        self.chip_selected = true;
    }
}

/// Delay that only keeps track of how long it would have slept.
#[derive(Default)]
pub struct MockDelay {
    pub elapsed_ns: u64,
}

impl MockDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

pub fn link_device(
    notifier: &Notifier,
    modem: ModemType,
) -> LinkDevice<'_, MockLink<'_>, MockDelay> {
    LinkDevice::new(
        modem,
        MockLink::new(notifier),
        MockDelay::default(),
        LAYOUT,
        notifier,
    )
    .unwrap()
}
