//! Create, verify and repair PAR1 and PAR2 parity archives.
//!
//! The crate is organized bottom-up: [`gf16`] provides the GF(2^16) field
//! and its SIMD-accelerated bulk kernel, [`rs16`] builds the Reed-Solomon
//! coder on top of it, and the [`par1`] and [`par2`] modules implement the
//! two on-disk formats. [`packets`] holds the PAR2 packet container shared
//! by the PAR2 encoder and decoder.
//!
//! I/O goes through the [`fileio::FileIO`] capability trait and progress
//! through [`reporters::Reporter`], so the whole pipeline can run against
//! in-memory doubles in tests.

pub mod checksum;
pub mod crc_window;
pub mod domain;
pub mod errors;
pub mod fileio;
pub mod gf16;
pub mod packets;
pub mod par1;
pub mod par2;
pub mod reporters;
pub mod rs16;

pub use errors::{ParError, Result};
