//! Byte-level container scanners that work without decoding pixels

pub mod gif;
pub mod webp;
