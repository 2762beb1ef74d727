//! Wire envelope and the typed events decoded from it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{ErrorKind, VoiceError};

pub const PROTOCOL_VERSION: &str = "1.6";

/// The unit exchanged with the signaling server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            version: Some(PROTOCOL_VERSION.to_string()),
        }
    }

    /// Parses an inbound frame. A missing or null payload becomes `{}`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let mut envelope: Envelope = serde_json::from_str(text)?;
        if envelope.payload.is_null() {
            envelope.payload = Value::Object(Map::new());
        }
        Ok(envelope)
    }
}

/// Error object carried in `error` and `hangup` payloads. Servers are not
/// strict about its shape, so a missing or non-integer code and a null
/// message decode to `None` and an empty string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<u32>,
    #[serde(default, deserialize_with = "lenient_message")]
    pub message: String,
    /// Attached by the channel for `error` envelopes.
    #[serde(skip)]
    pub typed: Option<VoiceError>,
}

impl ServerError {
    pub fn local(code: u32, message: impl Into<String>, typed: VoiceError) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            typed: Some(typed),
        }
    }

    /// Resolves the server code through the code table. Errors without a
    /// code become [`ErrorKind::UnknownError`] with the server's message.
    pub fn resolve(&self) -> VoiceError {
        match self.code {
            Some(code) => VoiceError::from_server(code, self.message.clone()),
            None if self.message.is_empty() => VoiceError::new(ErrorKind::UnknownError),
            None => VoiceError::with_message(ErrorKind::UnknownError, self.message.clone()),
        }
    }
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|c| u32::try_from(c).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_message<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// An `error` field that isn't an object is treated as absent.
fn lenient_error<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ServerError>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub voiceeventsid: Option<String>,
    #[serde(default, deserialize_with = "lenient_error")]
    pub error: Option<ServerError>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct InvitePayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub sdp: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CancelPayload {
    #[serde(default)]
    pub callsid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AnswerPayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub sdp: Option<String>,
    /// Signaling reconnect token issued by the server.
    #[serde(default)]
    pub reconnect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct HangupPayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default, deserialize_with = "lenient_error")]
    pub error: Option<ServerError>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RingingPayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub sdp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AckPayload {
    #[serde(default)]
    pub acktype: Option<String>,
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub voiceeventsid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub callsid: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub contenttype: Option<String>,
    #[serde(default)]
    pub messagetype: String,
    #[serde(default)]
    pub voiceeventsid: Option<String>,
}

/// Everything the channel dispatches, keyed by the envelope `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    Ready(Value),
    Offline,
    Error(ErrorPayload),
    Invite(InvitePayload),
    Cancel(CancelPayload),
    Answer(AnswerPayload),
    Hangup(HangupPayload),
    Ringing(RingingPayload),
    Connected(Value),
    Ack(AckPayload),
    Message(MessagePayload),
    /// The server asked us to go away; the channel destroys itself.
    Close,
    TransportOpen,
    TransportClose,
    Other { tag: String, payload: Value },
}

impl SignalEvent {
    pub fn tag(&self) -> &str {
        match self {
            Self::Ready(_) => "ready",
            Self::Offline => "offline",
            Self::Error(_) => "error",
            Self::Invite(_) => "invite",
            Self::Cancel(_) => "cancel",
            Self::Answer(_) => "answer",
            Self::Hangup(_) => "hangup",
            Self::Ringing(_) => "ringing",
            Self::Connected(_) => "connected",
            Self::Ack(_) => "ack",
            Self::Message(_) => "message",
            Self::Close => "close",
            Self::TransportOpen => "transportOpen",
            Self::TransportClose => "transportClose",
            Self::Other { tag, .. } => tag,
        }
    }

    /// Decodes an inbound envelope. Payloads that don't match the shape of
    /// their tag are kept as [`SignalEvent::Other`].
    pub fn from_wire(tag: &str, payload: Value) -> Self {
        match tag {
            "ready" => Self::Ready(payload),
            "offline" => Self::Offline,
            "close" => Self::Close,
            "connected" => Self::Connected(payload),
            "error" => decode(tag, payload, Self::Error),
            "invite" => decode(tag, payload, Self::Invite),
            "cancel" => decode(tag, payload, Self::Cancel),
            "answer" => decode(tag, payload, Self::Answer),
            "hangup" => decode(tag, payload, Self::Hangup),
            "ringing" => decode(tag, payload, Self::Ringing),
            "ack" => decode(tag, payload, Self::Ack),
            "message" => decode(tag, payload, Self::Message),
            _ => Self::Other {
                tag: tag.to_string(),
                payload,
            },
        }
    }
}

fn decode<T: DeserializeOwned>(
    tag: &str,
    payload: Value,
    wrap: impl FnOnce(T) -> SignalEvent,
) -> SignalEvent {
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(decoded) => wrap(decoded),
        Err(e) => {
            log::warn!(target: "SignalChannel", "Malformed '{tag}' payload: {e}");
            SignalEvent::Other {
                tag: tag.to_string(),
                payload,
            }
        }
    }
}
