pub mod files;
pub mod metadata;
pub mod wav_writer;
