pub mod channel_map;
pub mod levels;
