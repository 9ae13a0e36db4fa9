//! Instruction sets that artifacts are compiled for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A target instruction set.
///
/// Serialized and displayed with the canonical lowercase names used in
/// artifact directories (`oat/arm64/...`) and compiler flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionSet {
    /// 32-bit ARM (Thumb-2).
    Arm,
    /// AArch64.
    Arm64,
    /// 32-bit x86.
    X86,
    /// x86-64.
    #[serde(rename = "x86_64")]
    X86_64,
    /// RISC-V 64.
    Riscv64,
}

impl InstructionSet {
    /// All supported instruction sets.
    pub const ALL: [InstructionSet; 5] = [
        InstructionSet::Arm,
        InstructionSet::Arm64,
        InstructionSet::X86,
        InstructionSet::X86_64,
        InstructionSet::Riscv64,
    ];

    /// Returns the canonical name of this instruction set.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionSet::Arm => "arm",
            InstructionSet::Arm64 => "arm64",
            InstructionSet::X86 => "x86",
            InstructionSet::X86_64 => "x86_64",
            InstructionSet::Riscv64 => "riscv64",
        }
    }

    /// Returns `true` for 64-bit instruction sets.
    pub fn is_64_bit(&self) -> bool {
        matches!(
            self,
            InstructionSet::Arm64 | InstructionSet::X86_64 | InstructionSet::Riscv64
        )
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing instruction set names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instruction set: '{input}'")]
pub struct ParseIsaError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for InstructionSet {
    type Err = ParseIsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstructionSet::ALL
            .into_iter()
            .find(|isa| isa.as_str() == s)
            .ok_or_else(|| ParseIsaError {
                input: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() {
        assert_eq!("arm64".parse::<InstructionSet>().unwrap(), InstructionSet::Arm64);
        assert_eq!(
            "x86_64".parse::<InstructionSet>().unwrap(),
            InstructionSet::X86_64
        );
    }

    #[test]
    fn parse_rejects_aliases() {
        let err = "aarch64".parse::<InstructionSet>().unwrap_err();
        assert_eq!(err.input, "aarch64");
        assert!(err.to_string().contains("aarch64"));
    }

    #[test]
    fn display_matches_parse() {
        for isa in InstructionSet::ALL {
            assert_eq!(isa.to_string().parse::<InstructionSet>().unwrap(), isa);
        }
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&InstructionSet::X86_64).unwrap();
        assert_eq!(json, "\"x86_64\"");
        let back: InstructionSet = serde_json::from_str("\"riscv64\"").unwrap();
        assert_eq!(back, InstructionSet::Riscv64);
    }

    #[test]
    fn bitness() {
        assert!(InstructionSet::Arm64.is_64_bit());
        assert!(!InstructionSet::Arm.is_64_bit());
        assert!(!InstructionSet::X86.is_64_bit());
    }
}
