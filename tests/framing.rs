//! Packer and codec behavior over arbitrary byte streams

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use std::sync::Arc;
use tcp_router::core::codec::PacketCodec;
use tcp_router::core::message::Entry;
use tcp_router::core::packet::{DefaultPacker, Packer, HEADER_SIZE};
use tcp_router::error::ProtocolError;
use tokio_util::codec::Decoder;

fn encode_all(packer: &DefaultPacker, entries: &[Entry]) -> BytesMut {
    let mut buf = BytesMut::new();
    for entry in entries {
        packer.pack(entry, &mut buf).unwrap();
    }
    buf
}

proptest! {
    // Property: any split of a valid stream decodes to the same entries, in order
    #[test]
    fn prop_stream_decodes_regardless_of_chunking(
        messages in prop::collection::vec(
            (any::<u32>(), prop::collection::vec(any::<u8>(), 0..512)),
            1..16,
        ),
        chunk in 1usize..64,
    ) {
        let packer = DefaultPacker::new();
        let entries: Vec<Entry> = messages
            .iter()
            .map(|(id, data)| Entry::new(*id, data.clone()))
            .collect();
        let stream = encode_all(&packer, &entries);

        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(entry) = codec.decode(&mut buf).unwrap() {
                decoded.push(entry);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, entries);
    }

    // Property: any announced length above the limit is rejected from the header alone
    #[test]
    fn prop_oversized_length_rejected(max in 0usize..4096, excess in 1u32..1_000_000) {
        let packer = DefaultPacker::with_max_data_size(max);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(max as u32 + excess).to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());

        let result = packer.unpack(&mut buf);
        prop_assert!(matches!(result, Err(ProtocolError::OversizedPacket(_))));
    }
}

#[test]
fn empty_payload_frames_as_bare_header() {
    let packer = DefaultPacker::new();
    let bytes = packer.to_bytes(&Entry::new(9, Vec::<u8>::new())).unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE);

    let entry = packer.from_bytes(&bytes).unwrap();
    assert_eq!(entry.id, 9);
    assert!(entry.is_empty());
}

#[test]
fn eof_mid_frame_is_truncation() {
    let packer = DefaultPacker::new();
    let bytes = packer.to_bytes(&Entry::new(1, &b"hello"[..])).unwrap();

    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::from(&bytes[..bytes.len() - 2]);
    let result = codec.decode_eof(&mut buf);
    assert!(matches!(result, Err(ProtocolError::TruncatedPacket(_))));
}

#[test]
fn custom_packer_plugs_into_codec() {
    /// One-byte id, one-byte length
    struct TinyPacker;

    impl Packer for TinyPacker {
        fn pack(&self, entry: &Entry, dst: &mut BytesMut) -> tcp_router::error::Result<()> {
            if entry.id > u8::MAX as u32 || entry.len() > u8::MAX as usize {
                return Err(ProtocolError::OversizedPacket(entry.len()));
            }
            dst.extend_from_slice(&[entry.id as u8, entry.len() as u8]);
            dst.extend_from_slice(&entry.data);
            Ok(())
        }

        fn unpack(&self, src: &mut BytesMut) -> tcp_router::error::Result<Option<Entry>> {
            if src.len() < 2 || src.len() < 2 + src[1] as usize {
                return Ok(None);
            }
            let id = src[0] as u32;
            let len = src[1] as usize;
            let frame = src.split_to(2 + len);
            Ok(Some(Entry::new(id, frame.freeze().slice(2..))))
        }
    }

    assert!(TinyPacker.name().ends_with("TinyPacker"));
    assert_eq!(DefaultPacker::new().name(), "DefaultPacker");

    let mut codec = PacketCodec::new(Arc::new(TinyPacker));
    let mut buf = BytesMut::from(&[3u8, 2, b'o', b'k', 4, 0][..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(Entry::new(3, &b"ok"[..])));
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(Entry::new(4, Vec::<u8>::new())));
    assert!(codec.decode(&mut buf).unwrap().is_none());
}
