//! Protocol client for the signaling server.
//!
//! [`SignalChannel`] frames outbound control messages, replays the ones that
//! could not be sent once the transport reopens, and turns inbound frames
//! into [`SignalEvent`]s. It is driven synchronously: the owner feeds it
//! transport events and drains the events it raises.

pub mod envelope;

use log::{debug, info, trace, warn};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;

pub use envelope::{
    AckPayload, AnswerPayload, CancelPayload, Envelope, ErrorPayload, HangupPayload,
    InvitePayload, MessagePayload, PROTOCOL_VERSION, RingingPayload, ServerError, SignalEvent,
};

use crate::config::ChannelOptions;
use crate::error::{ErrorKind, VoiceError};
use crate::transport::{Transport, TransportEvent};

/// Longest reconnect hold the server accepts, in seconds.
pub const MAX_RECONNECT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connected,
    Ready,
    Offline,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Offline => "offline",
        }
    }
}

pub struct SignalChannel {
    transport: Arc<dyn Transport>,
    token: String,
    options: ChannelOptions,
    status: ChannelStatus,
    gateway: Option<String>,
    region: Option<String>,
    replay: VecDeque<(String, Value)>,
    events: VecDeque<SignalEvent>,
    destroyed: bool,
}

impl SignalChannel {
    pub fn new(token: impl Into<String>, transport: Arc<dyn Transport>, options: ChannelOptions) -> Self {
        Self {
            transport,
            token: token.into(),
            options,
            status: ChannelStatus::Disconnected,
            gateway: None,
            region: None,
            replay: VecDeque::new(),
            events: VecDeque::new(),
            destroyed: false,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == ChannelStatus::Disconnected
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn uri(&self) -> Option<String> {
        self.transport.uri()
    }

    /// Number of messages waiting for the next transport open.
    pub fn queued(&self) -> usize {
        self.replay.len()
    }

    /// Pops the oldest raised event.
    pub fn next_event(&mut self) -> Option<SignalEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<SignalEvent> {
        self.events.drain(..).collect()
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.destroyed {
            trace!(target: "SignalChannel", "Ignoring {event:?} after destroy");
            return;
        }
        match event {
            TransportEvent::Opened => self.on_transport_open(),
            TransportEvent::TextReceived(text) => self.on_transport_message(&text),
            TransportEvent::Closed => self.on_transport_close(),
            TransportEvent::Error(detail) => self.on_transport_error(detail),
        }
    }

    fn on_transport_open(&mut self) {
        info!(target: "SignalChannel", "Transport open");
        self.status = ChannelStatus::Connected;
        let token = self.token.clone();
        self.set_token(&token);
        self.emit(SignalEvent::TransportOpen);

        let pending: Vec<_> = self.replay.drain(..).collect();
        if !pending.is_empty() {
            debug!(target: "SignalChannel", "Replaying {} queued messages", pending.len());
        }
        for (kind, payload) in pending {
            self.publish_with_retry(&kind, payload, true);
        }
    }

    fn on_transport_message(&mut self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(target: "SignalChannel", "Dropping unparseable frame: {e}");
                return;
            }
        };
        trace!(target: "SignalChannel", "<-- {}", envelope.kind);

        if let Some(gateway) = envelope.payload.get("gateway").and_then(Value::as_str) {
            self.gateway = Some(gateway.to_string());
        }
        if let Some(region) = envelope.payload.get("region").and_then(Value::as_str) {
            self.region = Some(region.to_string());
        }

        let mut event = SignalEvent::from_wire(&envelope.kind, envelope.payload);
        if let SignalEvent::Error(ErrorPayload {
            error: Some(error), ..
        }) = &mut event
        {
            error.typed = Some(VoiceError::with_message(
                ErrorKind::SignalingConnectionError,
                error.message.clone(),
            ));
        }

        if matches!(event, SignalEvent::Close) {
            info!(target: "SignalChannel", "Received \"close\" from server, destroying channel");
            self.emit(event);
            self.destroy();
            return;
        }
        self.emit(event);
    }

    fn on_transport_close(&mut self) {
        if self.status != ChannelStatus::Disconnected {
            if self.status != ChannelStatus::Offline {
                self.emit(SignalEvent::Offline);
            }
            self.status = ChannelStatus::Disconnected;
        }
        self.emit(SignalEvent::TransportClose);
    }

    fn on_transport_error(&mut self, detail: Option<String>) {
        let error = match detail {
            None => ServerError::local(
                31000,
                "Websocket closed without a provided reason",
                VoiceError::new(ErrorKind::SignalingConnectionDisconnected),
            ),
            Some(detail) => ServerError::local(
                ErrorKind::SignalingConnectionError.code(),
                detail.clone(),
                VoiceError::with_message(ErrorKind::SignalingConnectionError, detail),
            ),
        };
        warn!(target: "SignalChannel", "Transport error: {}", error.message);
        self.emit(SignalEvent::Error(ErrorPayload {
            error: Some(error),
            ..Default::default()
        }));
    }

    fn emit(&mut self, event: SignalEvent) {
        match &event {
            SignalEvent::Ready(_) => self.status = ChannelStatus::Ready,
            SignalEvent::Offline => self.status = ChannelStatus::Offline,
            _ => {}
        }
        self.events.push_back(event);
    }

    fn publish_with_retry(&mut self, kind: &str, payload: Value, retry: bool) {
        let envelope = Envelope::new(kind, payload);
        let sent = match serde_json::to_string(&envelope) {
            Ok(text) => self.transport.send_text(&text),
            Err(e) => Err(anyhow::anyhow!("failed to serialize '{kind}': {e}")),
        };

        if let Err(e) = sent {
            debug!(target: "SignalChannel", "Could not send '{kind}': {e}");
            self.emit(SignalEvent::Error(ErrorPayload {
                error: Some(ServerError::local(
                    ErrorKind::TransportError.code(),
                    ErrorKind::TransportError.default_message(),
                    VoiceError::new(ErrorKind::TransportError),
                )),
                ..Default::default()
            }));
            if retry {
                self.replay.push_back((envelope.kind, envelope.payload));
            }
        }
    }

    /// Publishes an arbitrary control message, queueing it on failure.
    pub fn publish(&mut self, kind: &str, payload: Value) {
        self.publish_with_retry(kind, payload, true);
    }

    pub fn set_token(&mut self, token: &str) {
        info!(target: "SignalChannel", "Setting token and publishing listen");
        self.token = token.to_string();
        let payload = json!({
            "browserinfo": self.client_info(),
            "reconnectTimeout": self.reconnect_timeout(),
            "token": self.token,
        });
        self.publish_with_retry("listen", payload, false);
    }

    fn reconnect_timeout(&self) -> u64 {
        self.options
            .max_preferred_duration
            .map(|d| {
                let secs = d.as_millis().div_ceil(1000) as u64;
                secs.min(MAX_RECONNECT_TIMEOUT_SECS)
            })
            .unwrap_or(0)
    }

    fn client_info(&self) -> Value {
        let info = &self.options.client_info;
        json!({
            "browser": {
                "platform": info.platform,
                "userAgent": info.user_agent,
            },
            "p": "browser",
            "plugin": "rtc",
            "v": info.release,
        })
    }

    pub fn register(&mut self, media: Value) {
        self.publish("register", json!({ "media": media }));
    }

    /// `params` is the url-encoded custom parameter string.
    pub fn invite(&mut self, sdp: &str, call_sid: &str, params: Option<&str>) {
        let twilio = match params {
            Some(params) => json!({ "params": params }),
            None => json!({}),
        };
        self.publish(
            "invite",
            json!({ "callsid": call_sid, "sdp": sdp, "twilio": twilio }),
        );
    }

    /// Re-invites a call the server is holding for us. Travels as an
    /// `invite` carrying the reconnect token.
    pub fn reconnect(&mut self, sdp: &str, call_sid: &str, reconnect_token: &str) {
        self.publish(
            "invite",
            json!({
                "callsid": call_sid,
                "reconnect": reconnect_token,
                "sdp": sdp,
                "twilio": {},
            }),
        );
    }

    pub fn answer(&mut self, sdp: &str, call_sid: &str) {
        self.publish("answer", json!({ "sdp": sdp, "callsid": call_sid }));
    }

    pub fn dtmf(&mut self, call_sid: Option<&str>, digits: &str) {
        self.publish("dtmf", json!({ "callsid": call_sid, "dtmf": digits }));
    }

    pub fn hangup(&mut self, call_sid: &str, message: Option<&str>) {
        let payload = match message {
            Some(message) => json!({ "callsid": call_sid, "message": message }),
            None => json!({ "callsid": call_sid }),
        };
        self.publish("hangup", payload);
    }

    pub fn reject(&mut self, call_sid: Option<&str>) {
        self.publish("reject", json!({ "callsid": call_sid }));
    }

    /// Offers after an ICE restart are never replayed: a stale offer is
    /// worse than none.
    pub fn reinvite(&mut self, sdp: &str, call_sid: &str) {
        self.publish_with_retry("reinvite", json!({ "sdp": sdp, "callsid": call_sid }), false);
    }

    pub fn send_message(
        &mut self,
        call_sid: &str,
        content: &Value,
        content_type: Option<&str>,
        message_type: &str,
        voice_event_sid: &str,
    ) {
        self.publish(
            "message",
            json!({
                "callsid": call_sid,
                "content": content,
                "contenttype": content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
                "messagetype": message_type,
                "voiceeventsid": voice_event_sid,
            }),
        );
    }

    pub fn update_uris(&self, uris: Vec<String>) {
        self.transport.update_uris(uris);
    }

    pub fn update_preferred_uri(&self, uri: Option<String>) {
        self.transport.update_preferred_uri(uri);
    }

    /// Detaches from the transport, closes it and raises `offline`.
    pub fn destroy(&mut self) {
        info!(target: "SignalChannel", "Destroying channel");
        self.destroyed = true;
        self.transport.close();
        self.emit(SignalEvent::Offline);
    }
}
