//! stereotap: capture system audio and a microphone into a synthetic stereo
//! bus, segment it on silence, and emit 16 kHz WAV chunks.

pub mod audio;
pub mod config;
pub mod error;
mod logging;
mod telemetry;

pub use error::CaptureError;
pub use logging::{init_logging, log_debug, log_file_path};
pub use telemetry::init_telemetry;
