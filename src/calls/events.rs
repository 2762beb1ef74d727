use crate::error::VoiceError;
use crate::quality::{Sample, Warning};

use super::message::UserMessage;

/// Everything a call session reports to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// The call was answered and media is flowing. Raised once per call.
    Accept,
    Ringing { has_early_media: bool },
    Reconnecting(VoiceError),
    Reconnected,
    Disconnect,
    Cancel,
    Reject,
    Error(VoiceError),
    Warning { name: String, data: Option<Warning> },
    WarningCleared { name: String },
    Mute(bool),
    MessageReceived(UserMessage),
    MessageSent(UserMessage),
    Sample(Sample),
    Volume { input: f64, output: f64 },
    TransportClose,
}
