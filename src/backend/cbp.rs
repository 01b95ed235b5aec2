//! Backend for VIA CBP8.2 modems.
//!
//! These take their boot image through the mailbox: each pre-framed unit is copied into the
//! transmit buffer, announced with a request code and answered with a response code once the
//! modem consumed it.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, warn};

use crate::{
    Error, Link,
    backend::{BootFrame, Capabilities, ExtOps},
    link::LinkDevice,
    map::{self, MagicMap},
    timeout,
};

/// Magic announcing download mode, "DEDL".
pub const DP_MAGIC_DMDL: u32 = 0x4445_444C;

/// Largest unit accepted in one request.
pub const MAX_SEND_SIZE: usize = 0x800;

pub struct Cbp;

impl ExtOps for Cbp {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INIT_DL_MAP | Capabilities::XMIT_BINARY | Capabilities::SETDL_MAGIC
    }

    fn init_boot_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        ld.magic_map = MagicMap::boot(ld.link.size());
    }

    fn init_dl_map<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) {
        ld.dl_map = MagicMap::dload();
    }

    async fn xmit_binary<L: Link, D: DelayNs>(
        &self,
        ld: &mut LinkDevice<'_, L, D>,
        frame: BootFrame<'_>,
    ) -> Result<usize, Error> {
        let len = usize::min(frame.data.len(), MAX_SEND_SIZE);
        if len < frame.data.len() {
            warn!("{}: unit of {} bytes cut to {}", ld.name(), frame.data.len(), len);
        }

        if frame.req != 0 {
            let tx = ld.layout.tx_buff as usize;
            if !map::fits(ld.link.size(), tx, len) {
                error!("{}: ERR! unit of {} bytes overruns the window", ld.name(), len);
                return Err(Error::InvalidRequest);
            }

            ld.link.write_bytes(tx, &frame.data[..len]);
            ld.link.write16(ld.layout.mbx_ap2cp as usize, frame.req);
            debug!("{}: req 0x{:04x}, {} bytes", ld.name(), frame.req, len);
        }

        if frame.resp == 0 {
            return Ok(frame.data.len());
        }

        let notifier = ld.notifier;
        timeout::wait_for(&mut ld.delay, timeout::UDL_RESPONSE, || {
            notifier.udl_response.take()
        })
        .await
        .inspect_err(|_| error!("{}: ERR! no response to 0x{:04x}", ld.name(), frame.req))?;

        let received = ld.link.read16(ld.layout.mbx_cp2ap as usize);
        if received != frame.resp {
            error!(
                "{}: ERR! response 0x{:04x}, expected 0x{:04x}",
                ld.name(),
                received,
                frame.resp
            );
            return Err(Error::ProtocolMismatch {
                expected: frame.resp,
                received,
            });
        }

        Ok(frame.data.len())
    }

    fn setdl_magic<L: Link, D: DelayNs>(&self, ld: &mut LinkDevice<'_, L, D>) -> Result<(), Error> {
        ld.link.assert_chip_select();
        ld.link.write32(ld.layout.magic_ap2cp as usize, DP_MAGIC_DMDL);
        Ok(())
    }
}
