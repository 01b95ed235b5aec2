//! Control requests and the layout of their argument buffers.
//!
//! Requests that move a payload carry a [`UdlParam`] header, postcard-encoded, followed by the
//! payload bytes in the same buffer.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::{Error, frame::FrameHeader};

/// Request code without argument direction or size, the way `_IO(ty, nr)` builds it.
const fn io(ty: u8, nr: u8) -> u32 {
    ((ty as u32) << 8) | nr as u32
}

const IOCTL_MAGIC: u8 = b'o';

/// Control requests understood by the download backends.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ioctl {
    /// Wait until the modem is ready for a download.
    PhonePowerOn,
    /// Download the boot binary.
    PhoneImageLoad,
    /// Download the NV calibration data.
    NvDataLoad,
    /// Start the downloaded image and wait for the modem to come up.
    PhoneBootStart,
    /// Start uploading modem memory.
    UploadStep1,
    /// Receive one frame of modem memory.
    UploadStep2,
}

impl Ioctl {
    const ALL: [Ioctl; 6] = [
        Ioctl::PhonePowerOn,
        Ioctl::PhoneImageLoad,
        Ioctl::NvDataLoad,
        Ioctl::PhoneBootStart,
        Ioctl::UploadStep1,
        Ioctl::UploadStep2,
    ];

    pub const fn code(self) -> u32 {
        let nr = match self {
            Ioctl::PhonePowerOn => 0xd0,
            Ioctl::PhoneImageLoad => 0xd1,
            Ioctl::NvDataLoad => 0xd2,
            Ioctl::PhoneBootStart => 0xd3,
            Ioctl::UploadStep1 => 0xde,
            Ioctl::UploadStep2 => 0xdf,
        };
        io(IOCTL_MAGIC, nr)
    }
}

impl TryFrom<u32> for Ioctl {
    type Error = u32;

    fn try_from(cmd: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|request| request.code() == cmd)
            .ok_or(cmd)
    }
}

/// Header of a payload-carrying request.
///
/// For downloads `size` is the payload length and `count` the first frame sequence. For uploads
/// all three fields describe the frame that was received.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UdlParam {
    pub size: u32,
    pub count: u32,
    pub tag: u32,
}

impl From<FrameHeader> for UdlParam {
    fn from(header: FrameHeader) -> Self {
        Self {
            size: u32::from(header.size),
            count: u32::from(header.count),
            tag: u32::from(header.tag),
        }
    }
}

/// Largest encoding of a [`UdlParam`]: three varints of at most five bytes.
pub const MAX_HEADER_LEN: usize = 15;

/// Number of bytes `param` takes in front of the payload.
pub fn header_len(param: &UdlParam) -> Result<usize, Error> {
    let mut buf = [0u8; MAX_HEADER_LEN];
    postcard::to_slice(param, &mut buf)
        .map(|encoded| encoded.len())
        .map_err(|_| Error::InvalidRequest)
}

/// Allocate a zeroed buffer of `len` bytes, reporting allocation failure instead of aborting.
pub fn bounce_buffer(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhausted)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Decode the header of `arg` and copy the payload it announces.
///
/// Bytes behind the payload are ignored.
pub fn copy_in(arg: &[u8]) -> Result<(UdlParam, Vec<u8>), Error> {
    let (param, rest) =
        postcard::take_from_bytes::<UdlParam>(arg).map_err(|_| Error::InvalidRequest)?;

    let size = param.size as usize;
    let Some(payload) = rest.get(..size) else {
        return Err(Error::InvalidRequest);
    };

    let mut image = Vec::new();
    image
        .try_reserve_exact(size)
        .map_err(|_| Error::ResourceExhausted)?;
    image.extend_from_slice(payload);

    Ok((param, image))
}

/// Write `param` followed by `data` into `arg`, returning the number of bytes used.
pub fn copy_out(arg: &mut [u8], param: &UdlParam, data: &[u8]) -> Result<usize, Error> {
    let header = postcard::to_slice(param, arg)
        .map_err(|_| Error::InvalidRequest)?
        .len();

    let end = header + data.len();
    let Some(dst) = arg.get_mut(header..end) else {
        return Err(Error::InvalidRequest);
    };
    dst.copy_from_slice(data);

    Ok(end)
}

/// Build the argument of a download request, returning the number of bytes used.
pub fn encode_request(param: &UdlParam, payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    copy_out(out, param, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes() {
        assert_eq!(Ioctl::PhonePowerOn.code(), 0x6fd0);
        assert_eq!(Ioctl::PhoneBootStart.code(), 0x6fd3);
        assert_eq!(Ioctl::UploadStep2.code(), 0x6fdf);

        for request in Ioctl::ALL {
            assert_eq!(Ioctl::try_from(request.code()), Ok(request));
        }
        assert_eq!(Ioctl::try_from(0x6fd4), Err(0x6fd4));
        assert_eq!(Ioctl::try_from(0xd0), Err(0xd0));
    }

    #[test]
    fn request_argument() {
        let param = UdlParam {
            size: 5,
            count: 3,
            tag: 1,
        };
        let mut arg = [0xEEu8; 32];
        let used = encode_request(&param, b"hello", &mut arg).unwrap();

        let (decoded, image) = copy_in(&arg).unwrap();
        assert_eq!(decoded, param);
        assert_eq!(image, b"hello");
        assert_eq!(copy_in(&arg[..used]).unwrap().1, b"hello");
    }

    #[test]
    fn truncated_arguments() {
        assert_eq!(copy_in(&[]), Err(Error::InvalidRequest));

        let param = UdlParam {
            size: 8,
            ..UdlParam::default()
        };
        let mut arg = [0u8; 16];
        let used = encode_request(&param, &[1; 8], &mut arg).unwrap();
        assert_eq!(copy_in(&arg[..used - 1]), Err(Error::InvalidRequest));
    }

    #[test]
    fn copy_out_needs_room() {
        let param = UdlParam {
            size: 4,
            count: 1,
            tag: 3,
        };
        let mut small = [0u8; 5];
        assert_eq!(
            copy_out(&mut small, &param, &[1, 2, 3, 4]),
            Err(Error::InvalidRequest)
        );

        let mut arg = [0u8; 2];
        assert_eq!(copy_out(&mut arg, &param, &[]), Err(Error::InvalidRequest));
    }

    #[test]
    fn header_length() {
        assert_eq!(header_len(&UdlParam::default()), Ok(3));

        let param = UdlParam {
            size: 1024,
            count: 500,
            tag: 4,
        };
        let mut arg = [0u8; 32];
        let used = copy_out(&mut arg, &param, &[]).unwrap();
        assert_eq!(header_len(&param), Ok(used));

        let widest = UdlParam {
            size: u32::MAX,
            count: u32::MAX,
            tag: u32::MAX,
        };
        assert_eq!(header_len(&widest), Ok(MAX_HEADER_LEN));
    }

    #[test]
    fn bounce_buffer_is_zeroed() {
        let buf = bounce_buffer(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
