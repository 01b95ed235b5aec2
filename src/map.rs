//! Placement of the boot handshake fields within the shared window.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Distance between the download and the upload metadata fields.
pub const UPLOAD_OFFSET: usize = 0x1000;

/// Offset of the boot buffer behind the magic word, for bridges using a magic map.
pub const BOOT_BUFF_OFFSET: usize = 4;

/// Offset of the download buffer behind the magic word, for bridges using a magic map.
pub const DLOAD_BUFF_OFFSET: usize = 4;

/// Board-level offsets within the shared window, as agreed upon with the modem firmware.
///
/// All offsets are relative to the start of the window.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Host-to-modem buffer of the FMT channel, reused as download buffer.
    pub tx_buff: u32,
    /// Modem-to-host buffer of the FMT channel, reused as upload buffer.
    pub rx_buff: u32,
    pub boot_size_offset: u32,
    pub boot_tag_offset: u32,
    pub boot_count_offset: u32,
    /// Largest frame the modem accepts, and the capacity of both boot buffers.
    pub max_boot_frame_size: u32,
    /// 32-bit magic register written by the host.
    pub magic_ap2cp: u32,
    /// 16-bit mailbox, host to modem.
    pub mbx_ap2cp: u32,
    /// 16-bit mailbox, modem to host.
    pub mbx_cp2ap: u32,
}

/// Whether `len` bytes at `offset` lie within a window of `size` bytes.
pub const fn fits(size: usize, offset: usize, len: usize) -> bool {
    offset.saturating_add(len) <= size
}

impl Layout {
    /// Check that every field of both transfer directions lies within a window of `size` bytes.
    ///
    /// Accesses of other lengths, such as bridge-specific units or the crash log, are checked
    /// where they happen.
    pub fn validate(&self, size: usize) -> Result<(), Error> {
        let fits = |offset: u32, len: usize| fits(size, offset as usize, len);

        let frame = self.max_boot_frame_size as usize;
        let fields = [
            self.boot_size_offset,
            self.boot_tag_offset,
            self.boot_count_offset,
        ];

        let ok = frame <= u16::MAX as usize
            && fits(self.tx_buff, frame)
            && fits(self.rx_buff, frame)
            && fields.iter().all(|&field| fits(field, 2))
            && fields
                .iter()
                .all(|&field| (field as usize).saturating_add(UPLOAD_OFFSET + 2) <= size)
            && fits(self.magic_ap2cp, 4)
            && fits(self.mbx_ap2cp, 2)
            && fits(self.mbx_cp2ap, 2);

        if ok { Ok(()) } else { Err(Error::BadLayout) }
    }
}

/// Transfer direction, seen from the host.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Download,
    Upload,
}

/// Where the payload and the three 16-bit metadata fields of one direction live.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootMap {
    pub buff: usize,
    pub frame_size: usize,
    pub tag: usize,
    pub count: usize,
    /// Number of payload bytes the buffer holds.
    pub capacity: usize,
}

impl BootMap {
    pub const fn new(layout: &Layout, direction: Direction) -> Self {
        let (buff, shift) = match direction {
            Direction::Download => (layout.tx_buff as usize, 0),
            Direction::Upload => (layout.rx_buff as usize, UPLOAD_OFFSET),
        };

        Self {
            buff,
            frame_size: layout.boot_size_offset as usize + shift,
            tag: layout.boot_tag_offset as usize + shift,
            count: layout.boot_count_offset as usize + shift,
            capacity: layout.max_boot_frame_size as usize,
        }
    }
}

/// Magic word at the start of the window followed by a raw buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MagicMap {
    pub magic: usize,
    pub buff: usize,
    /// Bytes available behind the magic word, zero when unknown.
    pub space: usize,
}

impl MagicMap {
    pub const fn boot(window_size: usize) -> Self {
        Self {
            magic: 0,
            buff: BOOT_BUFF_OFFSET,
            space: window_size.saturating_sub(4),
        }
    }

    pub const fn dload() -> Self {
        Self {
            magic: 0,
            buff: DLOAD_BUFF_OFFSET,
            space: 0,
        }
    }
}
