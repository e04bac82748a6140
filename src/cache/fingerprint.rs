//! Content fingerprints for build inputs
//!
//! A fingerprint names a cache directory. It is derived from the ordered
//! input byte strings only; paths never participate.

use sha2::{Digest, Sha256};
use std::fmt;

/// Lowercase hex SHA-256 hash-of-hashes over an ordered input sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the rendered fingerprint in hex characters
    pub const LEN: usize = 64;

    /// Compute the fingerprint of an ordered sequence of inputs.
    ///
    /// Each input is digested on its own and the digests are hashed again,
    /// so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn compute<I, B>(inputs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut outer = Sha256::new();
        for input in inputs {
            outer.update(Sha256::digest(input.as_ref()));
        }
        Self(hex::encode(outer.finalize()))
    }

    /// Parse a fingerprint from a directory name, if it has the right shape
    pub fn from_hex(s: &str) -> Option<Self> {
        let valid = s.len() == Self::LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    /// The hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for display
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn deterministic() {
        let a = Fingerprint::compute(["fn main() {}", "true"]);
        let b = Fingerprint::compute(["fn main() {}", "true"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Fingerprint::LEN);
    }

    #[test]
    fn lowercase_hex() {
        let fp = Fingerprint::compute([b"x".as_slice()]);
        assert!(fp
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn concatenation_boundary_matters() {
        let a = Fingerprint::compute(["ab", "c"]);
        let b = Fingerprint::compute(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn order_matters() {
        let a = Fingerprint::compute(["one", "two"]);
        let b = Fingerprint::compute(["two", "one"]);
        assert_ne!(a, b);
    }

    #[test]
    fn flag_changes_fingerprint() {
        let a = Fingerprint::compute(["source", "false"]);
        let b = Fingerprint::compute(["source", "true"]);
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_inputs_do_not_collide() {
        // Deterministic pseudo-random sample of distinct input sequences
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut seen_inputs = HashSet::new();
        let mut seen_fingerprints = HashSet::new();

        for _ in 0..2000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let count = (state % 4) as usize + 1;
            let inputs: Vec<String> = (0..count)
                .map(|i| format!("{:x}", state.rotate_left(i as u32 * 8)))
                .collect();

            if seen_inputs.insert(inputs.clone()) {
                assert!(seen_fingerprints.insert(Fingerprint::compute(&inputs)));
            }
        }
    }

    #[test]
    fn empty_input_list_is_stable() {
        let empty: [&str; 0] = [];
        assert_eq!(Fingerprint::compute(empty), Fingerprint::compute(empty));
        assert_ne!(Fingerprint::compute(empty), Fingerprint::compute([""]));
    }

    #[test]
    fn from_hex_validates_shape() {
        let fp = Fingerprint::compute(["a"]);
        assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp.clone()));
        assert_eq!(fp.short().len(), 12);
        assert!(Fingerprint::from_hex("not-a-fingerprint").is_none());
        assert!(Fingerprint::from_hex(&fp.as_str().to_uppercase()).is_none());
    }
}
