//! CLI command implementations.
//!
//! Every command operates on the memory of the `pagesafe` process itself.

pub mod compare;
pub mod fill;
pub mod hex_utils;
pub mod hexdump;
pub mod patch;
pub mod probe;
pub mod selftest;
