pub mod ascii_render;
pub mod audio;
pub mod config;
pub mod decoding;
pub mod display;
pub mod error_codes;
pub mod frame;
pub mod geometry;
pub mod pacing;
pub mod pipeline;
pub mod player;
pub mod probe;
pub mod status;
