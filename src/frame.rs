//! Moving single frames through the boot buffer, and the bookkeeping of multi-frame transfers.

use log::warn;

use crate::{Error, Link, SharedMemory, Tag, map::BootMap, notify::host};

/// Descriptor of the frame currently in flight.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferParams {
    /// Start of the frame within the source image.
    pub offset: usize,
    pub size: usize,
    pub tag: Tag,
    /// Sequence count announced with the frame.
    pub count: u16,
}

/// Counters of a multi-frame transfer.
///
/// `rest + sent == total` holds between any two steps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Progress {
    pub total: usize,
    pub rest: usize,
    pub sent: usize,
}

/// Outcome of accounting for an acknowledged frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    /// Another frame has to go out.
    Next,
    /// The whole image has been consumed by the modem.
    Complete,
}

/// One download, from the first frame to the acknowledgement of the last.
pub struct Session<'a> {
    image: &'a [u8],
    frame_cap: usize,
    params: TransferParams,
    progress: Progress,
}

impl<'a> Session<'a> {
    /// NV data always goes out as sequence 1, whatever the caller asked for.
    pub fn new(image: &'a [u8], frame_cap: usize, tag: Tag, count: u16) -> Self {
        let total = image.len();

        Self {
            image,
            frame_cap,
            params: TransferParams {
                offset: 0,
                size: usize::min(frame_cap, total),
                tag,
                count: if tag == Tag::Nv { 1 } else { count },
            },
            progress: Progress {
                total,
                rest: total,
                sent: 0,
            },
        }
    }

    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Payload of the current frame.
    pub fn frame(&self) -> &'a [u8] {
        &self.image[self.params.offset..self.params.offset + self.params.size]
    }

    /// Account for the acknowledged frame and move on to the next one.
    ///
    /// After the last frame the tag is cleared and no further frame is prepared.
    pub fn advance(&mut self) -> Step {
        let size = self.params.size;

        self.progress.sent += size;
        self.progress.rest -= size;
        self.params.offset += size;
        debug_assert_eq!(
            self.progress.rest + self.progress.sent,
            self.progress.total
        );

        if self.progress.sent >= self.progress.total {
            self.params.tag = Tag::None;
            return Step::Complete;
        }

        if self.progress.rest < self.frame_cap {
            self.params.size = self.progress.rest;
        }
        self.params.count = self.params.count.wrapping_add(1);

        Step::Next
    }
}

/// Place one frame in the boot buffer and tell the modem about it.
pub fn transmit(
    link: &mut impl Link,
    map: &BootMap,
    data: &[u8],
    params: &TransferParams,
) -> Result<(), Error> {
    if data.len() > map.capacity {
        warn!("frame of {} bytes exceeds boot buffer of {}", data.len(), map.capacity);
        return Err(Error::InvalidRequest);
    }

    link.write_bytes(map.buff, data);
    link.write16(map.frame_size, data.len() as u16);
    link.write16(map.tag, params.tag as u16);
    link.write16(map.count, params.count);

    link.send_intr(host::FRAME_SENT);

    Ok(())
}

/// Metadata of a frame placed in the boot buffer by the modem.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    pub size: u16,
    pub tag: u16,
    pub count: u16,
}

/// Metadata of the frame currently staged by the modem, leaving the frame in place.
pub fn header(link: &impl SharedMemory, map: &BootMap) -> FrameHeader {
    FrameHeader {
        size: link.read16(map.frame_size),
        tag: link.read16(map.tag),
        count: link.read16(map.count),
    }
}

/// Copy the frame the modem placed in the boot buffer into `dst`, and hand the buffer back.
///
/// A frame that does not fit `dst` is neither copied nor acknowledged.
pub fn receive(link: &mut impl Link, map: &BootMap, dst: &mut [u8]) -> Result<FrameHeader, Error> {
    let header = header(&*link, map);

    let size = header.size as usize;
    if size > map.capacity || size > dst.len() {
        warn!(
            "upload frame of {} bytes does not fit (buffer {}, destination {})",
            size,
            map.capacity,
            dst.len()
        );
        return Err(Error::InvalidRequest);
    }

    link.read_bytes(map.buff, &mut dst[..size]);
    link.send_intr(host::FRAME_SENT);

    Ok(header)
}
