//! The PAR2 parity-archive format: encoder and decoder over the packet
//! container in [`crate::packets`].

pub mod decoder;
pub mod encoder;

pub use decoder::Decoder;
pub use encoder::{Encoder, RecoveryFileLayout, DEFAULT_SLICE_BYTE_COUNT};
