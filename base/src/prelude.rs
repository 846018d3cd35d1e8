//! The prelude exports the word, address and instruction types used
//! throughout the simulator.
pub use super::instruction::*;
pub use super::onescomplement::error::*;
pub use super::onescomplement::unsigned::*;
pub use super::subword::{join_halves, left_half, right_half, split_halves};
pub use super::types::*;
pub use super::{u18, u36, u6};
