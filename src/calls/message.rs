use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::error::CallError;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A user-defined message exchanged over an established call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub content: Value,
    pub content_type: Option<String>,
    pub message_type: String,
    /// Correlation id, assigned when the message is sent or received.
    pub voice_event_sid: Option<String>,
}

impl UserMessage {
    pub fn new(content: Value, message_type: impl Into<String>) -> Self {
        Self {
            content,
            content_type: None,
            message_type: message_type.into(),
            voice_event_sid: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if self.content.is_null() {
            return Err(CallError::InvalidArgument("`content` is empty".to_string()));
        }
        if self.message_type.is_empty() {
            return Err(CallError::InvalidArgument(
                "`messageType` must be a non-empty string.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of locally generated identifiers.
pub trait IdGenerator: Send {
    /// Correlation id for an outbound user message.
    fn voice_event_sid(&mut self) -> String;

    /// Placeholder call id used until the server assigns one.
    fn temp_call_sid(&mut self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

const HEX: &[u8; 16] = b"0123456789abcdef";

fn random_hex(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(HEX[rng.random_range(0..16)]))
        .collect()
}

impl IdGenerator for RandomIds {
    fn voice_event_sid(&mut self) -> String {
        format!("KX{}", random_hex(&mut rand::rng(), 32))
    }

    fn temp_call_sid(&mut self) -> String {
        let mut rng = rand::rng();
        let variant = char::from(HEX[rng.random_range(8..12)]);
        format!(
            "TJS{}-{}-4{}-{}{}-{}",
            random_hex(&mut rng, 8),
            random_hex(&mut rng, 4),
            random_hex(&mut rng, 3),
            variant,
            random_hex(&mut rng, 3),
            random_hex(&mut rng, 12),
        )
    }
}
