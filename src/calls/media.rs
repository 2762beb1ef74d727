//! Capability interface of the media engine.
//!
//! The engine owns capture, the peer connection and its SDP. It reports back
//! through [`MediaEvent`]s; SDP it produces is relayed over the signaling
//! channel by the session.

use serde_json::Value;
use std::time::Duration;

use crate::error::{ErrorKind, VoiceError};

/// Options for [`MediaEngine::open_input`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptOptions {
    /// Opaque capture constraints forwarded to the engine.
    pub audio_constraints: Option<Value>,
}

/// Why the engine could not open the local input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputError {
    pub code: Option<u32>,
    pub name: String,
    pub message: String,
}

impl InputError {
    pub fn is_permission_denied(&self) -> bool {
        self.code == Some(31208)
            || self.name == "PermissionDeniedError"
            || self.name == "NotAllowedError"
    }

    pub fn to_voice_error(&self) -> VoiceError {
        if self.is_permission_denied() {
            VoiceError::new(ErrorKind::UserMediaPermissionDenied)
        } else {
            VoiceError::new(ErrorKind::UserMediaAcquisitionFailed)
        }
    }
}

/// An engine failure; `disconnect` asks the session to end the call.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaError {
    pub error: VoiceError,
    pub disconnect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFailure {
    ConnectionDisconnected,
    ConnectionFailed,
    IceGatheringFailed,
    LowBytes,
}

impl MediaFailure {
    /// Failures that mark the end of an ICE cycle and justify a restart.
    pub fn ends_ice_cycle(self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::IceGatheringFailed)
    }
}

/// State machines of the peer connection whose transitions are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateGroup {
    IceConnection,
    IceGathering,
    Signaling,
    DtlsTransport,
    PeerConnection,
}

impl StateGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IceConnection => "ice-connection-state",
            Self::IceGathering => "ice-gathering-state",
            Self::Signaling => "signaling-state",
            Self::DtlsTransport => "dtls-transport-state",
            Self::PeerConnection => "pc-connection-state",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    InputReady,
    InputFailed(InputError),
    /// Initial offer of an outgoing call.
    LocalOffer { sdp: String },
    /// Answer to the remote offer of an incoming call.
    LocalAnswer { sdp: String },
    /// Offer produced by an ICE restart.
    RestartOffer { sdp: String },
    /// Remote description applied; the call is negotiated.
    Negotiated { codec: Option<String>, codec_params: Option<String> },
    Opened,
    Disconnected { message: String },
    Failed { message: String },
    Reconnected { message: String },
    IceGatheringFailed { reason: String },
    Error(MediaError),
    /// Levels in `0.0..=1.0` plus the raw engine levels in `0.0..=255.0`.
    Volume {
        input: f64,
        output: f64,
        internal_input: f64,
        internal_output: f64,
    },
    StateChanged { group: StateGroup, state: String },
    Closed,
}

pub trait DtmfSender: Send {
    fn can_insert_dtmf(&self) -> bool {
        true
    }

    fn insert_dtmf(&mut self, tones: &str, duration: Duration, gap: Duration);
}

pub trait MediaEngine: Send {
    fn open_input(&mut self, options: &AcceptOptions);

    fn answer_incoming_call(&mut self, call_sid: &str, offer_sdp: Option<&str>) -> Result<(), MediaError>;

    fn make_outgoing_call(
        &mut self,
        params: &str,
        reconnect_token: Option<&str>,
        call_sid: &str,
    ) -> Result<(), MediaError>;

    fn process_answer(&mut self, sdp: &str) -> Result<(), MediaError>;

    fn ice_restart(&mut self);

    /// Tears the connection down. The engine reports [`MediaEvent::Closed`].
    fn close(&mut self);

    fn ignore(&mut self, call_sid: Option<&str>);

    fn reject(&mut self, call_sid: Option<&str>);

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    fn local_description(&self) -> Option<String>;

    fn is_ice_disconnected(&self) -> bool;

    /// Whether the engine can tell when an ICE restart completed. Without
    /// it a failed connection is not worth retrying.
    fn observes_ice_restart(&self) -> bool {
        true
    }

    fn dtmf_sender(&mut self) -> Option<&mut dyn DtmfSender>;

    fn set_call_sid(&mut self, call_sid: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        let denied = InputError {
            code: None,
            name: "NotAllowedError".into(),
            message: "no".into(),
        };
        assert_eq!(denied.to_voice_error().code, 31401);

        let by_code = InputError {
            code: Some(31208),
            name: "Other".into(),
            message: String::new(),
        };
        assert!(by_code.is_permission_denied());

        let missing = InputError {
            code: None,
            name: "NotFoundError".into(),
            message: "no device".into(),
        };
        assert_eq!(missing.to_voice_error().kind, ErrorKind::UserMediaAcquisitionFailed);
    }

    #[test]
    fn test_ice_cycle_failures() {
        assert!(MediaFailure::ConnectionFailed.ends_ice_cycle());
        assert!(MediaFailure::IceGatheringFailed.ends_ice_cycle());
        assert!(!MediaFailure::LowBytes.ends_ice_cycle());
        assert!(!MediaFailure::ConnectionDisconnected.ends_ice_cycle());
    }
}
