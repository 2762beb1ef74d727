pub mod calls;
pub mod config;
pub mod error;
pub mod quality;
pub mod signaling;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use calls::{CallEvent, CallHandle, CallRunner, CallSetup, CallStatus};
pub use error::{CallError, ErrorKind, VoiceError};
