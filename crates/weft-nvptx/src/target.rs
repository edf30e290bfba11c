//! Target description shared by the optimizer, emitter and assembler.

use std::str::FromStr;

use target_lexicon::{PointerWidth, Triple};
use tracing::debug;

/// Whether `triple` names a 64-bit architecture.
///
/// Unrecognized triples count as 32-bit.
pub fn is_arch_64_bit(triple: &str) -> bool {
    match Triple::from_str(triple) {
        Ok(parsed) => matches!(parsed.pointer_width(), Ok(PointerWidth::U64)),
        Err(err) => {
            debug!(triple, %err, "unrecognized target triple");
            false
        }
    }
}

/// PTX ISA version requested by a `+ptxNN` feature, as `(major, minor)`.
pub fn ptx_version(features: &str) -> Option<(u32, u32)> {
    features
        .split(',')
        .filter_map(|f| f.trim().strip_prefix("+ptx"))
        .filter_map(|digits| digits.parse::<u32>().ok())
        .next_back()
        .map(|n| (n / 10, n % 10))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetMachine {
    pub triple: String,
    pub chip: String,
    pub features: String,
}

impl TargetMachine {
    pub fn new(triple: impl Into<String>, chip: impl Into<String>, features: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            chip: chip.into(),
            features: features.into(),
        }
    }

    pub fn is_64_bit(&self) -> bool {
        is_arch_64_bit(&self.triple)
    }

    pub fn pointer_bytes(&self) -> u64 {
        if self.is_64_bit() { 8 } else { 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvptx64_is_64_bit() {
        assert!(is_arch_64_bit("nvptx64-nvidia-cuda"));
        assert!(!is_arch_64_bit("not a triple"));
    }

    #[test]
    fn ptx_version_from_features() {
        assert_eq!(ptx_version("+ptx60"), Some((6, 0)));
        assert_eq!(ptx_version("+sm_70,+ptx75"), Some((7, 5)));
        assert_eq!(ptx_version(""), None);
    }
}
