//! Machine configuration.
//!
//! A [`CpuConfiguration`] is built once (usually from
//! [`CpuConfiguration::for_variant`], then adjusted) and is checked
//! by [`CpuConfiguration::validate`] before the machine is built.
//! Front ends may persist it with serde.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use base::prelude::*;

use crate::variant::Variant;

/// The memory protection option installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protection {
    None,
    /// User-mode references below the bounds register trap.
    Bounds,
    /// Base+length relocation of user-mode references.
    Relocation,
    /// Relocation with an optional bypass and a shared window.
    Xvm,
}

impl Display for Protection {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Protection::None => "none",
            Protection::Bounds => "bounds",
            Protection::Relocation => "relocation",
            Protection::Xvm => "XVM",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfiguration {
    pub variant: Variant,
    /// Installed memory, in words.  A multiple of 4K.
    pub memory_words: u32,
    pub eae: bool,
    pub api: bool,
    pub fp15: bool,
    pub protection: Protection,
    /// Maximum nesting of XCT instructions before execution stops.
    pub xct_max: u32,
    /// Stop on unimplemented instructions rather than treating them
    /// as no-ops.
    pub stop_on_unimplemented: bool,
    /// Number of entries kept in the instruction history; zero
    /// disables it.
    pub history_capacity: usize,
    /// PDP-15 only: start in bank mode (rather than page mode) after
    /// a reset, interrupt or trap.
    pub bank_mode_at_reset: bool,
}

impl CpuConfiguration {
    /// The fullest configuration the variant supports.
    pub fn for_variant(variant: Variant) -> CpuConfiguration {
        CpuConfiguration {
            variant,
            memory_words: variant.max_memory(),
            eae: variant.can_have_eae(),
            api: variant.can_have_api(),
            fp15: variant.can_have_fp15(),
            protection: match variant {
                Variant::Pdp4 | Variant::Pdp7 => Protection::None,
                Variant::Pdp9 => Protection::Bounds,
                Variant::Pdp15 => Protection::Relocation,
            },
            xct_max: 16,
            stop_on_unimplemented: true,
            history_capacity: 0,
            bank_mode_at_reset: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let v = self.variant;
        let unsupported = |option: &'static str| ConfigurationError::UnsupportedOption {
            variant: v,
            option,
        };
        if self.memory_words == 0
            || self.memory_words % 0o10_000 != 0
            || self.memory_words > v.max_memory()
        {
            return Err(ConfigurationError::MemorySize {
                variant: v,
                words: self.memory_words,
            });
        }
        if self.eae && !v.can_have_eae() {
            return Err(unsupported("EAE"));
        }
        if self.api && !v.can_have_api() {
            return Err(unsupported("API"));
        }
        if self.fp15 && !v.can_have_fp15() {
            return Err(unsupported("FP15"));
        }
        if !v.can_have_protection(self.protection) {
            return Err(unsupported(match self.protection {
                Protection::None => "no protection",
                Protection::Bounds => "bounds protection",
                Protection::Relocation => "relocation",
                Protection::Xvm => "XVM",
            }));
        }
        if self.xct_max == 0 {
            return Err(ConfigurationError::XctLimit);
        }
        Ok(())
    }
}

/// A configuration problem found while building the machine.  These
/// are always fatal: the machine is never built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Two registrations (or a registration and the processor
    /// itself) claim the same device number.
    DeviceConflict {
        device: Unsigned6Bit,
        first: String,
        second: String,
    },
    /// A registration extends past device 77.
    DeviceRange { base: Unsigned6Bit, slots: u8 },
    /// Two registrations claim the same API line.
    ApiLineConflict { level: u8, line: u8 },
    /// An API assignment names a level or line which does not exist.
    ApiLineRange { level: u8, line: u8 },
    UnsupportedOption {
        variant: Variant,
        option: &'static str,
    },
    MemorySize { variant: Variant, words: u32 },
    XctLimit,
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigurationError::DeviceConflict {
                device,
                first,
                second,
            } => write!(
                f,
                "device number {device:02o} is claimed by both {first} and {second}"
            ),
            ConfigurationError::DeviceRange { base, slots } => write!(
                f,
                "a device occupying {slots} slots cannot start at device number {base:02o}"
            ),
            ConfigurationError::ApiLineConflict { level, line } => {
                write!(f, "API level {level} line {line} is assigned twice")
            }
            ConfigurationError::ApiLineRange { level, line } => {
                write!(f, "API level {level} line {line} does not exist")
            }
            ConfigurationError::UnsupportedOption { variant, option } => {
                write!(f, "the {variant} cannot be fitted with {option}")
            }
            ConfigurationError::MemorySize { variant, words } => write!(
                f,
                "{words:o} words is not a valid memory size for the {variant}"
            ),
            ConfigurationError::XctLimit => f.write_str("the XCT nesting limit must be at least 1"),
        }
    }
}

impl Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configurations_are_valid() {
        for v in Variant::all_variants() {
            assert_eq!(CpuConfiguration::for_variant(v).validate(), Ok(()));
        }
    }

    #[test]
    fn test_rejects_unsupported_options() {
        let mut c = CpuConfiguration::for_variant(Variant::Pdp4);
        c.eae = true;
        assert!(matches!(
            c.validate(),
            Err(ConfigurationError::UnsupportedOption { option: "EAE", .. })
        ));

        let mut c = CpuConfiguration::for_variant(Variant::Pdp9);
        c.protection = Protection::Xvm;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_memory_size() {
        let mut c = CpuConfiguration::for_variant(Variant::Pdp9);
        c.memory_words = 0o200_000;
        assert!(matches!(
            c.validate(),
            Err(ConfigurationError::MemorySize { .. })
        ));
        c.memory_words = 0o10_001;
        assert!(c.validate().is_err());
        c.memory_words = 0o20_000;
        assert_eq!(c.validate(), Ok(()));
    }
}
