//! Reversible byte transforms applied to sealed snapshots before they reach a slot store.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::fiction::errors::FictionError;
use crate::validation::{validate_file_size, MAX_SNAPSHOT_BYTES};

/// A reversible transform over the stored byte stream (compression, encryption).
/// `reverse(apply(x)) == x` must hold for every input.
pub trait ByteTransform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError>;
    fn reverse(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl ByteTransform for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError> {
        Ok(bytes)
    }

    fn reverse(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError> {
        Ok(bytes)
    }
}

/// gzip via flate2. Inflating stops with an error once the output would pass
/// `max_output` bytes.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: u32,
    max_output: u64,
}

impl Gzip {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
            max_output: MAX_SNAPSHOT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_output: u64) -> Self {
        self.max_output = max_output;
        self
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl ByteTransform for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::new(self.level));
        encoder.write_all(&bytes)?;
        Ok(encoder.finish()?)
    }

    fn reverse(&self, bytes: Vec<u8>) -> Result<Vec<u8>, FictionError> {
        let mut decoder = GzDecoder::new(bytes.as_slice()).take(self.max_output.saturating_add(1));
        let mut out = Vec::with_capacity(bytes.len() * 2);
        decoder.read_to_end(&mut out)?;
        validate_file_size(out.len() as u64, self.max_output)?;
        Ok(out)
    }
}
