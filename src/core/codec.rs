//! Tokio codec adapting a [`Packer`] to `FramedRead`/`FramedWrite`.

use bytes::BytesMut;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::message::Entry;
use crate::core::packet::{DefaultPacker, Packer};
use crate::error::{ProtocolError, Result};

/// Framing codec backed by a shared packer.
#[derive(Clone)]
pub struct PacketCodec {
    packer: Arc<dyn Packer>,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(Arc::new(DefaultPacker::new()))
    }
}

impl PacketCodec {
    pub fn new(packer: Arc<dyn Packer>) -> Self {
        Self { packer }
    }

    pub fn packer(&self) -> &Arc<dyn Packer> {
        &self.packer
    }
}

impl Decoder for PacketCodec {
    type Item = Entry;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.packer.unpack(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(entry) => Ok(Some(entry)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedPacket(src.len())),
        }
    }
}

impl Encoder<Entry> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Entry, dst: &mut BytesMut) -> Result<()> {
        self.packer.pack(&item, dst)
    }
}

impl Encoder<&Entry> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Entry, dst: &mut BytesMut) -> Result<()> {
        self.packer.pack(item, dst)
    }
}
