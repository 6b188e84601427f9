//! Content hashing for the reconciliation engine.
//!
//! The snapshot format and the rename-detection heuristic both depend on a
//! 128-bit content digest. MD5 is used — not for any cryptographic property,
//! but because it is what the sidecar format this engine is compatible with
//! already uses, and the threat model here is *accidental* collision between
//! unrelated files, not an adversary. [`DigestAlgorithm`] names the choice in
//! one place so a future bump is a single-site change.
//!
//! Streaming I/O keeps memory use constant regardless of file size.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

// 256KB: matches the scanner/mutator copy buffer, good default for streaming reads.
const HASH_BUFFER_SIZE: usize = 256 * 1024;

/// The digest algorithm backing [`ContentDigest`]. Single-site if it ever needs to change.
pub const DIGEST_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Md5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
}

/// A 128-bit content digest, hex-encoded for display and snapshot storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// An empty/unset digest (file could not be hashed).
    pub const EMPTY: ContentDigest = ContentDigest([0u8; 16]);

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("{self}")
    }

    pub fn from_hex(s: &str) -> Option<ContentDigest> {
        if s.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(ContentDigest(bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Hash the contents of a file, streamed in fixed-size chunks.
///
/// A file that cannot be opened or fully read surfaces its I/O error so the
/// caller can decide to drop the scan entry entirely, per the scanner's policy.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut ctx = md5::Context::new();

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        ctx.consume(&buffer[..bytes_read]);
    }

    Ok(ContentDigest(ctx.compute().0))
}

/// Hash bytes directly, used by tests and small in-memory payloads.
pub fn hash_bytes(data: &[u8]) -> ContentDigest {
    ContentDigest(md5::compute(data).0)
}
