//! WAL frame encoding

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TideError};

/// CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 8;

/// Frame a payload: `[crc32][len][payload]`, little endian
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        TideError::WalWrite(format!("payload of {} bytes exceeds frame limit", payload.len()))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_u32_le(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}
