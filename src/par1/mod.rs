//! The PAR1 parity-volume format: volume codec, encoder and decoder.

pub mod decoder;
pub mod encoder;
pub mod file_entry;
pub mod volume;

pub use decoder::Decoder;
pub use encoder::{Encoder, MAX_PARITY_VOLUMES};
pub use file_entry::FileEntry;
pub use volume::{read_volume, write_volume, Volume, VolumeHeader};
