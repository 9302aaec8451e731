//! Outbound frame serialization for the gateway.
//!
//! Every payload is packed to ETF and written into one deflate stream that
//! lives as long as the connection. A sync flush after each write makes every
//! returned chunk a self-contained decompression unit, while the shared
//! dictionary keeps compressing across messages the way the client's
//! zlib-stream transport expects.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use serde_json::Value;

use super::etf;

/// Internal buffer growth step. Implementation detail, not a wire guarantee.
const CHUNK_SIZE: usize = 128 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("deflate error: {0}")]
    Compress(#[from] flate2::CompressError),
    #[error("inflate error: {0}")]
    Decompress(#[from] flate2::DecompressError),
    #[error(transparent)]
    Etf(#[from] etf::EtfError),
}

/// Per-connection encoder. One instance per gateway session; the compression
/// context must never be shared or recreated mid-connection.
pub struct FrameCodec {
    deflate: Compress,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            deflate: Compress::new(Compression::default(), true),
        }
    }

    /// Packs `payload` and pushes it through the stream, returning exactly
    /// one receivable unit (ETF bytes deflated and sync-flushed).
    pub fn encode(&mut self, payload: &Value) -> Result<Vec<u8>, CodecError> {
        let packed = etf::encode(payload);
        let mut input = packed.as_slice();
        let mut out = Vec::with_capacity(CHUNK_SIZE.min(packed.len() + 64));
        loop {
            out.reserve(CHUNK_SIZE.min(input.len() + 64));
            let before = self.deflate.total_in();
            let status = self
                .deflate
                .compress_vec(input, &mut out, FlushCompress::Sync)?;
            let consumed = (self.deflate.total_in() - before) as usize;
            input = &input[consumed..];
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if input.is_empty() && out.len() < out.capacity() {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the zlib-stream transport: feeds chunks into a shared
/// inflate context and decodes each flush boundary back to a payload. The
/// server never receives compressed frames, so this lives here for the codec
/// contract tests and for test clients.
pub struct StreamInflater {
    inflate: Decompress,
}

impl StreamInflater {
    pub fn new() -> Self {
        Self {
            inflate: Decompress::new(true),
        }
    }

    /// Inflates one transport chunk (one flush unit) to its ETF bytes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut input = chunk;
        let mut out = Vec::with_capacity(CHUNK_SIZE.min(chunk.len() * 4 + 64));
        loop {
            out.reserve(CHUNK_SIZE.min(input.len() * 4 + 64));
            let before = self.inflate.total_in();
            let status = self
                .inflate
                .decompress_vec(input, &mut out, FlushDecompress::Sync)?;
            let consumed = (self.inflate.total_in() - before) as usize;
            input = &input[consumed..];
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if input.is_empty() && out.len() < out.capacity() {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Inflates one chunk and decodes the resulting term.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Value, CodecError> {
        let raw = self.push(chunk)?;
        Ok(etf::decode(&raw)?)
    }
}

impl Default for StreamInflater {
    fn default() -> Self {
        Self::new()
    }
}
