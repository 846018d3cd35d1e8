//! Fixed-width unsigned word types for the 18-bit machines, and the
//! arithmetic conventions (one's complement for ADD, two's
//! complement for TAD and the index registers) applied to them.

pub mod arith;
pub mod error;
pub mod unsigned;
