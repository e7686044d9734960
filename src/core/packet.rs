//! Packet framing.
//!
//! A [`Packer`] converts an [`Entry`] into its wire representation and splits complete
//! entries back off a receive buffer. Implementations must be stateless: one packer
//! instance is shared by every session of a server.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::MAX_DATA_SIZE;
use crate::core::message::Entry;
use crate::error::{ProtocolError, Result};

/// Header length of the default packer: data length (4) + message id (4)
pub const HEADER_SIZE: usize = 8;

/// Converts entries to framed bytes and back.
pub trait Packer: Send + Sync + 'static {
    /// Append the framed form of `entry` to `dst`.
    fn pack(&self, entry: &Entry, dst: &mut BytesMut) -> Result<()>;

    /// Split one complete entry off the front of `src`.
    ///
    /// Returns `Ok(None)` while the buffer holds less than a full frame. Implementations
    /// must reject oversized lengths from the header alone, before reserving room for
    /// the payload.
    fn unpack(&self, src: &mut BytesMut) -> Result<Option<Entry>>;

    /// Name used in logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Frame a single entry into a standalone buffer
    fn to_bytes(&self, entry: &Entry) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.pack(entry, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse exactly one frame from `data`
    fn from_bytes(&self, data: &[u8]) -> Result<Entry> {
        let mut buf = BytesMut::from(data);
        match self.unpack(&mut buf)? {
            Some(entry) if buf.is_empty() => Ok(entry),
            Some(_) => Err(ProtocolError::InvalidHeader),
            None => Err(ProtocolError::TruncatedPacket(data.len())),
        }
    }
}

/// Length-prefixed packer.
///
/// ```text
/// [DataLength: u32 LE] [MessageId: u32 LE] [Data: DataLength bytes]
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DefaultPacker {
    max_data_size: usize,
}

impl Default for DefaultPacker {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultPacker {
    pub fn new() -> Self {
        Self {
            max_data_size: MAX_DATA_SIZE,
        }
    }

    /// Packer rejecting payloads longer than `max_data_size` bytes
    pub fn with_max_data_size(max_data_size: usize) -> Self {
        Self {
            max_data_size: max_data_size.min(u32::MAX as usize),
        }
    }

    pub fn max_data_size(&self) -> usize {
        self.max_data_size
    }
}

impl Packer for DefaultPacker {
    fn pack(&self, entry: &Entry, dst: &mut BytesMut) -> Result<()> {
        let len = entry.data.len();
        if len > self.max_data_size {
            return Err(ProtocolError::OversizedPacket(len));
        }

        dst.reserve(HEADER_SIZE + len);
        dst.put_u32_le(len as u32);
        dst.put_u32_le(entry.id);
        dst.extend_from_slice(&entry.data);
        Ok(())
    }

    fn unpack(&self, src: &mut BytesMut) -> Result<Option<Entry>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_data_size {
            return Err(ProtocolError::OversizedPacket(len));
        }

        let frame_len = HEADER_SIZE + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src.get_u32_le();
        let data = src.split_to(len).freeze();
        Ok(Some(Entry { id, data }))
    }

    fn name(&self) -> &'static str {
        "DefaultPacker"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian_length_then_id() {
        let packer = DefaultPacker::new();
        let bytes = packer.to_bytes(&Entry::new(0x0102_0304, &b"abc"[..])).unwrap();
        assert_eq!(&bytes[..4], &[3, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..], b"abc");
    }

    #[test]
    fn oversized_length_rejected_before_reserve() {
        let packer = DefaultPacker::with_max_data_size(16);
        let mut buf = BytesMut::new();
        buf.put_u32_le(1 << 30);
        buf.put_u32_le(7);
        let capacity = buf.capacity();

        let result = packer.unpack(&mut buf);
        assert!(matches!(result, Err(ProtocolError::OversizedPacket(n)) if n == 1 << 30));
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let packer = DefaultPacker::new();
        let full = packer.to_bytes(&Entry::new(9, vec![1u8; 32])).unwrap();

        let mut buf = BytesMut::from(&full[..20]);
        assert!(packer.unpack(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);

        buf.extend_from_slice(&full[20..]);
        let entry = packer.unpack(&mut buf).unwrap().unwrap();
        assert_eq!(entry.id, 9);
        assert_eq!(entry.data.len(), 32);
        assert!(buf.is_empty());
    }

    #[test]
    fn pack_refuses_payload_over_limit() {
        let packer = DefaultPacker::with_max_data_size(4);
        let mut buf = BytesMut::new();
        let result = packer.pack(&Entry::new(1, vec![0u8; 5]), &mut buf);
        assert!(matches!(result, Err(ProtocolError::OversizedPacket(5))));
        assert!(buf.is_empty());
    }

    #[test]
    fn from_bytes_reports_truncation() {
        let packer = DefaultPacker::new();
        let full = packer.to_bytes(&Entry::new(1, &b"hello"[..])).unwrap();
        let result = packer.from_bytes(&full[..full.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::TruncatedPacket(_))));
    }
}
