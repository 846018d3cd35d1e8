//! The four machines of the family.
//!
//! | Variant | Max memory | PC width | EAE | API | Protection              | FP15 | Page mode |
//! | ------- | ---------- | -------- | --- | --- | ----------------------- | ---- | --------- |
//! | PDP-4   | 8K         | 13 bits  | no  | no  | none                    | no   | no        |
//! | PDP-7   | 32K        | 15 bits  | yes | no  | none                    | no   | no        |
//! | PDP-9   | 32K        | 15 bits  | yes | yes | bounds                  | no   | no        |
//! | PDP-15  | 128K       | 17 bits  | yes | yes | bounds, relocation, XVM | yes  | yes       |
//!
//! Most of what differs between the machines is a method here.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::config::Protection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    Pdp4,
    Pdp7,
    Pdp9,
    Pdp15,
}

impl Variant {
    #[must_use]
    pub const fn all_variants() -> [Variant; 4] {
        [Variant::Pdp4, Variant::Pdp7, Variant::Pdp9, Variant::Pdp15]
    }

    /// Largest memory the variant can address, in words.
    pub const fn max_memory(self) -> u32 {
        match self {
            Variant::Pdp4 => 0o20_000,
            Variant::Pdp7 | Variant::Pdp9 => 0o100_000,
            Variant::Pdp15 => 0o400_000,
        }
    }

    /// Mask for the implemented address bits.
    pub const fn address_mask(self) -> u32 {
        self.max_memory() - 1
    }

    /// Bits of the PC which an incrementing PC never changes.  The PC
    /// wraps within an 8K field on the older machines and within a
    /// 32K block on the PDP-15.
    pub const fn pc_increment_mask(self) -> u32 {
        match self {
            Variant::Pdp15 => 0o077_777,
            _ => 0o017_777,
        }
    }

    pub const fn can_have_eae(self) -> bool {
        !matches!(self, Variant::Pdp4)
    }

    pub const fn can_have_api(self) -> bool {
        matches!(self, Variant::Pdp9 | Variant::Pdp15)
    }

    pub const fn can_have_fp15(self) -> bool {
        matches!(self, Variant::Pdp15)
    }

    pub const fn can_have_protection(self, p: Protection) -> bool {
        match p {
            Protection::None => true,
            Protection::Bounds => matches!(self, Variant::Pdp9 | Variant::Pdp15),
            Protection::Relocation | Protection::Xvm => matches!(self, Variant::Pdp15),
        }
    }

    /// The PDP-15 has index registers and page-mode addressing.
    pub const fn has_index_registers(self) -> bool {
        matches!(self, Variant::Pdp15)
    }

    /// Extend mode (PDP-7/9) or bank mode (PDP-15).
    pub const fn has_extend_mode(self) -> bool {
        !matches!(self, Variant::Pdp4)
    }

    /// On the PDP-4 and PDP-7 each 8K field has its own auto-index
    /// registers; later machines always use those of field 0.
    pub const fn auto_index_in_field_zero(self) -> bool {
        matches!(self, Variant::Pdp9 | Variant::Pdp15)
    }

    /// Width of the PC saved in the return word of a JMS or an
    /// interrupt.
    pub const fn return_pc_mask(self) -> u32 {
        match self {
            Variant::Pdp4 => 0o017_777,
            _ => 0o077_777,
        }
    }

    /// The user-mode bit exists only on machines with memory
    /// protection.
    pub const fn saves_user_mode(self) -> bool {
        matches!(self, Variant::Pdp9 | Variant::Pdp15)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Variant::Pdp4 => "PDP-4",
            Variant::Pdp7 => "PDP-7",
            Variant::Pdp9 => "PDP-9",
            Variant::Pdp15 => "PDP-15",
        }
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct UnknownVariantName(String);

impl Display for UnknownVariantName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown machine variant '{}'", self.0)
    }
}

impl Error for UnknownVariantName {}

impl TryFrom<&str> for Variant {
    type Error = UnknownVariantName;
    fn try_from(s: &str) -> Result<Variant, UnknownVariantName> {
        Variant::all_variants()
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s) || v.name().replace('-', "").eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariantName(s.to_owned()))
    }
}

#[test]
fn test_variant_name_round_trip() {
    for v in Variant::all_variants() {
        assert_eq!(Variant::try_from(v.to_string().as_str()).ok(), Some(v));
    }
    assert_eq!(Variant::try_from("pdp15").ok(), Some(Variant::Pdp15));
    assert!(Variant::try_from("PDP-11").is_err());
}

#[test]
fn test_option_matrix() {
    assert!(!Variant::Pdp4.can_have_eae());
    assert!(Variant::Pdp7.can_have_eae());
    assert!(!Variant::Pdp7.can_have_api());
    assert!(Variant::Pdp9.can_have_protection(Protection::Bounds));
    assert!(!Variant::Pdp9.can_have_protection(Protection::Relocation));
    assert!(Variant::Pdp15.can_have_protection(Protection::Xvm));
    assert_eq!(Variant::Pdp15.address_mask(), 0o377_777);
}
