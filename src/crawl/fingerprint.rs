//! Content fingerprinting for entries whose inclusion depends on content.
//!
//! Uses BLAKE3 for the digest and a magic-byte/text sniff for indexability.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Bytes inspected when sniffing indexability.
const SNIFF_LEN: usize = 8192;

/// Share of control/undecodable characters tolerated in "text".
const MAX_BINARY_RATIO: f64 = 0.05;

const INDEXABLE_MAGIC: &[&[u8]] = &[
    b"%PDF",
    b"{\\rtf",
    b"PK\x03\x04",
    b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1",
];

/// Digest and indexability verdict for a fetched copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// BLAKE3 digest as hex.
    pub digest: String,
    pub length: u64,
    pub indexable: bool,
}

/// Inspects a local copy of an entry's content.
#[async_trait]
pub trait FingerprintActivity: Send + Sync {
    async fn fingerprint(&self, local: &Path) -> Result<Fingerprint>;
}

/// Default activity: BLAKE3 digest plus a content sniff.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSniffer;

impl ContentSniffer {
    pub fn new() -> Self {
        Self
    }

    /// Decide indexability from the leading bytes of a file.
    pub fn sniff(head: &[u8]) -> bool {
        if head.is_empty() {
            return false;
        }
        if INDEXABLE_MAGIC.iter().any(|magic| head.starts_with(magic)) {
            return true;
        }

        let text = String::from_utf8_lossy(head);
        let mut total = 0usize;
        let mut binary = 0usize;
        for ch in text.chars() {
            total += 1;
            if ch == char::REPLACEMENT_CHARACTER || (ch.is_control() && !matches!(ch, '\t' | '\n' | '\r')) {
                binary += 1;
            }
        }
        (binary as f64) / (total as f64) <= MAX_BINARY_RATIO
    }

    fn fingerprint_blocking(path: &Path) -> Result<Fingerprint> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut head = Vec::with_capacity(SNIFF_LEN);
        let mut buffer = [0u8; 65536]; // 64KB buffer
        let mut length = 0u64;

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(bytes_read);
                head.extend_from_slice(&buffer[..take]);
            }
            hasher.update(&buffer[..bytes_read]);
            length += bytes_read as u64;
        }

        Ok(Fingerprint {
            digest: hasher.finalize().to_hex().to_string(),
            length,
            indexable: Self::sniff(&head),
        })
    }
}

#[async_trait]
impl FingerprintActivity for ContentSniffer {
    async fn fingerprint(&self, local: &Path) -> Result<Fingerprint> {
        let path = local.to_path_buf();
        tokio::task::spawn_blocking(move || Self::fingerprint_blocking(&path)).await?
    }
}
