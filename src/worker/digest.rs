//! Streaming file digest.
//!
//! Content arrives in chunks and is folded into a running SHA-256 state; the
//! final digest is rendered as lowercase hex. The algorithm is an
//! implementation detail: the master stores whatever string a worker reports.

use sha2::{Digest, Sha256};

#[derive(Clone, Default)]
pub struct ContentDigest {
    hasher: Sha256,
    bytes: u64,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Digest of an in-memory buffer.
pub fn digest_hex(content: &[u8]) -> String {
    let mut digest = ContentDigest::new();
    digest.update(content);
    digest.finalize_hex()
}
