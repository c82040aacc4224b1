//! Hashing utilities for configuration digests.

use sha2::{Digest, Sha256};

/// Length of a short digest in hex characters.
pub const SHORT_DIGEST_LEN: usize = 16;

/// A hasher for building fingerprints from multiple components.
///
/// Every component is framed so that adjacent components cannot run
/// together (`"ab" + "c"` and `"a" + "bc"` produce different fingerprints).
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a tag byte, used to distinguish component kinds.
    pub fn update_tag(&mut self, tag: u8) -> &mut Self {
        self.hasher.update([tag]);
        self
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update((s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    /// Add multiple strings to the fingerprint, including their count.
    pub fn update_strs<'a>(&mut self, items: impl ExactSizeIterator<Item = &'a str>) -> &mut Self {
        self.hasher.update((items.len() as u64).to_le_bytes());
        for s in items {
            self.update_str(s);
        }
        self
    }

    /// Add an integer component.
    pub fn update_i64(&mut self, n: i64) -> &mut Self {
        self.hasher.update(n.to_le_bytes());
        self
    }

    /// Add a boolean component.
    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint.
    pub fn finish_short(self) -> String {
        let mut full = self.finish();
        full.truncate(SHORT_DIGEST_LEN);
        full
    }
}
