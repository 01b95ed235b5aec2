//! Upload of modem memory after a crash.
//!
//! The upload runs with the notification interrupt masked: the host polls the notification line
//! itself so that the interrupt handler does not swallow the codes. Step one performs the
//! handshake, step two is called repeatedly and moves one frame per call until the modem sends
//! the end tag, at which point the interrupt is unmasked again.

use core::ops::{Deref, DerefMut};

use embedded_hal_async::delay::DelayNs;
use log::{error, info};

use crate::{
    Error, Link,
    frame::{self, FrameHeader},
    ioctl::{self, UdlParam},
    link::LinkDevice,
    map::Direction,
    notify::{PeerCommand, host},
    timeout::{self, Deadline},
};

/// Tag of the last frame of an upload.
pub const UPLOAD_END_TAG: u16 = 4;

/// Keeps the notification interrupt masked, unmasking it on drop unless told otherwise.
pub struct IrqMask<'a, L: Link> {
    link: &'a mut L,
    restore: bool,
}

impl<'a, L: Link> IrqMask<'a, L> {
    pub fn new(link: &'a mut L) -> Self {
        link.disable_irq();
        Self {
            link,
            restore: true,
        }
    }

    /// Leave the interrupt masked when the guard goes away.
    pub fn keep(mut self) {
        self.restore = false;
    }
}

impl<L: Link> Deref for IrqMask<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.link
    }
}

impl<L: Link> DerefMut for IrqMask<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.link
    }
}

impl<L: Link> Drop for IrqMask<'_, L> {
    fn drop(&mut self) {
        if self.restore {
            self.link.enable_irq();
        }
    }
}

/// Wait for the modem to raise `expected` on the notification line.
///
/// Any other code is a protocol error. When `last_chance` is set, the code register is read once
/// more after the budget ran out, in case the line level was missed.
async fn poll_code<L: Link>(
    link: &mut L,
    delay: &mut impl DelayNs,
    expected: PeerCommand,
    last_chance: bool,
) -> Result<(), Error> {
    let expected = expected.code();
    let mut deadline = Deadline::new(timeout::UPLOAD_POLL);

    loop {
        if link.notification_pending() {
            let received = link.recv_intr();
            if received == expected {
                return Ok(());
            }
            error!("ERR! invalid intr 0x{:04x}", received);
            return Err(Error::ProtocolMismatch { expected, received });
        }

        if deadline.sleep(&mut *delay).await.is_err() {
            let received = link.recv_intr();
            info!("count {} ms, intr 0x{:04x}", deadline.elapsed_ms(), received);
            if last_chance && received == expected {
                return Ok(());
            }
            return Err(Error::Timeout);
        }
    }
}

/// Handshake with the modem and ask it to start uploading.
///
/// Leaves the notification interrupt masked on success only.
pub async fn step1<L: Link, D: DelayNs>(ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
    ld.set_direction(Direction::Upload);
    ld.upload_staged = false;

    info!("+---------------------------------------------+");
    info!("|            UPLOAD PHONE SDRAM               |");
    info!("+---------------------------------------------+");

    let mut link = IrqMask::new(&mut ld.link);
    poll_code(&mut *link, &mut ld.delay, PeerCommand::Ready, true).await?;

    link.send_intr(host::BEGIN_UPLOAD);
    link.keep();

    Ok(())
}

/// Wait until the modem staged the next frame.
///
/// The announcement is consumed once; a frame that was announced but not taken is still
/// staged on the next call.
async fn await_frame<L: Link, D: DelayNs>(ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
    if !ld.upload_staged {
        poll_code(&mut ld.link, &mut ld.delay, PeerCommand::FrameAck, false).await?;
        ld.upload_staged = true;
    }
    Ok(())
}

/// Copy the staged frame into `dst` and hand the buffer back to the modem.
fn take_frame<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
    dst: &mut [u8],
) -> Result<FrameHeader, Error> {
    let header = frame::receive(&mut ld.link, &ld.boot_map, dst)?;
    ld.upload_staged = false;

    if header.count % 500 == 0 {
        info!("param->count = {}", header.count);
    }

    if header.tag == UPLOAD_END_TAG {
        ld.link.enable_irq();
        info!("param->tag = {}", header.tag);
    }

    Ok(header)
}

/// Receive the next frame into `dst`.
///
/// Unmasks the notification interrupt after the final frame. On error the interrupt stays as it
/// was; the caller has to unmask it. A frame too large for `dst` stays with the modem.
pub async fn receive_frame<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
    dst: &mut [u8],
) -> Result<FrameHeader, Error> {
    await_frame(ld).await?;
    take_frame(ld, dst)
}

/// Ioctl flavour of [`receive_frame`]: the frame is bounced through the kernel side and copied
/// out into `arg` together with its header.
///
/// The room left in `arg` behind the header bounds the frame before anything is copied.
pub async fn step2<L: Link, D: DelayNs>(
    ld: &mut LinkDevice<'_, L, D>,
    arg: &mut [u8],
) -> Result<usize, Error> {
    await_frame(ld).await?;

    let staged = UdlParam::from(frame::header(&ld.link, &ld.boot_map));
    let room = arg.len().saturating_sub(ioctl::header_len(&staged)?);

    let mut bounce = ioctl::bounce_buffer(usize::min(ld.boot_map.capacity, room))?;
    let header = take_frame(ld, &mut bounce)?;

    ioctl::copy_out(arg, &UdlParam::from(header), &bounce[..header.size as usize])
}

#[cfg(test)]
mod tests {
    use std::vec;

    use super::*;
    use crate::{
        ModemType,
        ioctl::Ioctl,
        mock::{Frame, link_device},
        notify::Notifier,
    };

    #[test]
    fn handshake_and_frames() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        ld.link.pending.push_back(PeerCommand::Ready.code());
        ld.link.upload.extend([
            Frame::new(&[1; 1024], 3, 500),
            Frame::new(&[2; 100], UPLOAD_END_TAG, 501),
        ]);

        let mut dst = [0u8; 1024];
        embassy_futures::block_on(async {
            step1(&mut ld).await.unwrap();
            assert!(!ld.link.irq_enabled);

            let header = receive_frame(&mut ld, &mut dst).await.unwrap();
            assert_eq!((header.size, header.tag, header.count), (1024, 3, 500));
            assert!(dst.iter().all(|&b| b == 1));
            assert!(!ld.link.irq_enabled);

            let header = receive_frame(&mut ld, &mut dst).await.unwrap();
            assert_eq!((header.size, header.tag), (100, UPLOAD_END_TAG));
            assert!(dst[..100].iter().all(|&b| b == 2));
        });

        assert!(ld.link.irq_enabled);
        assert_eq!(
            ld.link.raised,
            [host::BEGIN_UPLOAD, host::FRAME_SENT, host::FRAME_SENT]
        );
    }

    #[test]
    fn handshake_mismatch_restores_irq() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        ld.link.pending.push_back(0xBEEF);

        let result = embassy_futures::block_on(step1(&mut ld));

        assert_eq!(
            result,
            Err(Error::ProtocolMismatch {
                expected: 0x1234,
                received: 0xBEEF
            })
        );
        assert!(ld.link.irq_enabled);
        assert!(ld.link.raised.is_empty());
    }

    #[test]
    fn handshake_timeout_restores_irq() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);

        let result = embassy_futures::block_on(step1(&mut ld));

        assert_eq!(result, Err(Error::Timeout));
        assert!(ld.link.irq_enabled);
        assert_eq!(ld.delay.elapsed_ms(), 201);
    }

    #[test]
    fn handshake_last_chance_read() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        // Code register already holds the ready code but the line level was never seen.
        ld.link.pending.push_back(PeerCommand::Ready.code());
        ld.link.recv_intr();

        assert_eq!(embassy_futures::block_on(step1(&mut ld)), Ok(()));
        assert!(!ld.link.irq_enabled);
        assert_eq!(ld.link.raised, [host::BEGIN_UPLOAD]);
    }

    #[test]
    fn frame_timeout_through_ioctl_restores_irq() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        ld.link.pending.push_back(PeerCommand::Ready.code());

        let mut arg = vec![0u8; 2048];
        embassy_futures::block_on(async {
            ld.ioctl(Ioctl::UploadStep1.code(), &mut []).await.unwrap();
            assert!(!ld.link.irq_enabled);

            // The modem never stages a frame.
            let result = ld.ioctl(Ioctl::UploadStep2.code(), &mut arg).await;
            assert_eq!(result, Err(Error::Timeout));
        });

        assert!(ld.link.irq_enabled);
    }

    #[test]
    fn step2_copies_header_and_frame() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcEsc6270);
        ld.link.pending.push_back(PeerCommand::Ready.code());
        ld.link
            .upload
            .push_back(Frame::new(&[0xC3; 64], UPLOAD_END_TAG, 7));

        let mut arg = vec![0u8; 128];
        let written = embassy_futures::block_on(async {
            ld.ioctl(Ioctl::UploadStep1.code(), &mut []).await.unwrap();
            ld.ioctl(Ioctl::UploadStep2.code(), &mut arg).await.unwrap()
        });

        let (param, rest) = postcard::take_from_bytes::<UdlParam>(&arg[..written]).unwrap();
        assert_eq!(
            param,
            UdlParam {
                size: 64,
                count: 7,
                tag: u32::from(UPLOAD_END_TAG)
            }
        );
        assert_eq!(rest, &[0xC3; 64]);
        assert!(ld.link.irq_enabled);
    }

    #[test]
    fn step2_rejects_small_destination() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        ld.link.pending.push_back(PeerCommand::Ready.code());
        ld.link.upload.extend([
            Frame::new(&[0xAA; 512], 3, 1),
            Frame::new(&[0xBB; 16], UPLOAD_END_TAG, 2),
        ]);

        let mut small = vec![0u8; 100];
        let mut arg = vec![0u8; 2048];
        let (rejected, accepted) = embassy_futures::block_on(async {
            ld.ioctl(Ioctl::UploadStep1.code(), &mut []).await.unwrap();
            let rejected = ld.ioctl(Ioctl::UploadStep2.code(), &mut small).await;
            let raised = ld.link.raised.len();
            let accepted = ld.ioctl(Ioctl::UploadStep2.code(), &mut arg).await;
            ((rejected, raised), accepted)
        });

        // Neither copied nor handed back to the modem.
        assert_eq!(rejected, (Err(Error::InvalidRequest), 1));
        assert!(small.iter().all(|&b| b == 0));

        // Still staged for a retry with enough room.
        let written = accepted.unwrap();
        let (param, rest) = postcard::take_from_bytes::<UdlParam>(&arg[..written]).unwrap();
        assert_eq!((param.size, param.count), (512, 1));
        assert!(rest.iter().all(|&b| b == 0xAA));
        assert_eq!(ld.link.raised, [host::BEGIN_UPLOAD, host::FRAME_SENT]);
    }

    #[test]
    fn step2_accepts_exact_fit() {
        let notifier = Notifier::new();
        let mut ld = link_device(&notifier, ModemType::QcMdm6600);
        ld.link.pending.push_back(PeerCommand::Ready.code());
        ld.link.upload.push_back(Frame::new(&[7; 90], 3, 1));

        let header = ioctl::header_len(&UdlParam {
            size: 90,
            count: 1,
            tag: 3,
        })
        .unwrap();
        let mut arg = vec![0u8; header + 90];
        let result = embassy_futures::block_on(async {
            ld.ioctl(Ioctl::UploadStep1.code(), &mut []).await.unwrap();
            ld.ioctl(Ioctl::UploadStep2.code(), &mut arg).await
        });

        assert_eq!(result, Ok(header + 90));
        assert_eq!(arg[header..], [7; 90]);
    }
}
