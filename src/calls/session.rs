//! Per-call state machine.
//!
//! [`CallSession`] is synchronous. Every entry point mutates state, drives the
//! signaling channel and the media engine, and queues [`CallEvent`]s for the
//! owner to drain. Asynchronous completions (transport frames, media and
//! monitor callbacks, timer firings) are fed back in through the `handle_*`
//! methods, one at a time.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use log::{debug, error, info, trace, warn};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::dtmf::{
    DtmfQueues, INTER_TONE_GAP, PAUSE_DURATION, SIDETONE_INTERVAL, TONE_DURATION, TonePlayer,
    validate_digits,
};
use super::events::CallEvent;
use super::media::{AcceptOptions, InputError, MediaEngine, MediaError, MediaEvent, MediaFailure};
use super::message::{IdGenerator, UserMessage};
use super::reconnect::ReconnectPolicy;
use super::state::{
    CallDirection, CallStatus, MediaStatus, Phase, SignalingStatus, derive_status,
};
use super::timer::{Timer, TimerId, Timers};
use crate::config::{CallOptions, RELEASE_VERSION};
use crate::error::{CallError, ErrorKind, VoiceError};
use crate::quality::metrics::round2;
use crate::quality::{
    CallMetrics, Metric, MetricRecord, MonitorEvent, QualityMonitor, Sample, ThresholdKind,
    Warning, WarningValue,
};
use crate::signaling::{
    AckPayload, AnswerPayload, CancelPayload, ErrorPayload, HangupPayload, MessagePayload,
    RingingPayload, ServerError, SignalChannel, SignalEvent,
};
use crate::telemetry::{CallContext, Level, MetricsBatch, Publisher, TelemetryEvent};
use crate::transport::TransportEvent;

const MEDIA_FAILED_MESSAGE: &str = "Media connection failed.";
const MEDIA_INTERRUPTED_MESSAGE: &str = "Connection with the media server was interrupted.";
const HANGUP_ERROR_MESSAGE: &str = "Error sent from gateway in HANGUP";
const DTMF_DISCONNECTED_MESSAGE: &str = "Could not send DTMF: Signaling channel is disconnected";

/// Consecutive identical volume samples before the level counts as stuck.
const VOLUME_STREAK_LIMIT: u32 = 10;
const CONSTANT_INPUT_LEVEL: &str = "constant-audio-input-level";
const CONSTANT_OUTPUT_LEVEL: &str = "constant-audio-output-level";
const ICE_CONNECTIVITY_LOST: &str = "ice-connectivity-lost";
const STIR_VERIFIED: &str = "TN-Validation-Passed-A";

/// Signal events the session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Listener {
    Ack,
    Answer,
    Cancel,
    Connected,
    Error,
    Hangup,
    Message,
    Ringing,
    TransportClose,
}

impl Listener {
    const INITIAL: [Listener; 7] = [
        Listener::Ack,
        Listener::Cancel,
        Listener::Error,
        Listener::Ringing,
        Listener::TransportClose,
        Listener::Connected,
        Listener::Message,
    ];

    fn for_event(event: &SignalEvent) -> Option<Self> {
        match event {
            SignalEvent::Ack(_) => Some(Self::Ack),
            SignalEvent::Answer(_) => Some(Self::Answer),
            SignalEvent::Cancel(_) => Some(Self::Cancel),
            SignalEvent::Connected(_) => Some(Self::Connected),
            SignalEvent::Error(_) => Some(Self::Error),
            SignalEvent::Hangup(_) => Some(Self::Hangup),
            SignalEvent::Message(_) => Some(Self::Message),
            SignalEvent::Ringing(_) => Some(Self::Ringing),
            SignalEvent::TransportClose => Some(Self::TransportClose),
            SignalEvent::Ready(_)
            | SignalEvent::Offline
            | SignalEvent::Invite(_)
            | SignalEvent::Close
            | SignalEvent::TransportOpen
            | SignalEvent::Other { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackIssue {
    AudioLatency,
    ChoppyAudio,
    DroppedCall,
    Echo,
    NoisyCall,
    OneWayAudio,
}

impl FeedbackIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AudioLatency => "audio-latency",
            Self::ChoppyAudio => "choppy-audio",
            Self::DroppedCall => "dropped-call",
            Self::Echo => "echo",
            Self::NoisyCall => "noisy-call",
            Self::OneWayAudio => "one-way-audio",
        }
    }
}

/// Caller verification reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerInfo {
    pub is_verified: bool,
}

enum StreakChange {
    Raised(u32),
    Cleared(u32),
    Unchanged,
}

/// Run length of identical volume samples in one direction, and whether a
/// warning for it is currently up.
#[derive(Debug, Default)]
struct VolumeStreak {
    last: Option<f64>,
    count: u32,
    raised: bool,
}

impl VolumeStreak {
    /// A long streak is only raised while `quiet` is false, but stays
    /// eligible until it is.
    fn observe(&mut self, value: f64, quiet: bool) -> StreakChange {
        self.count = if self.last == Some(value) {
            self.count.saturating_add(1)
        } else {
            1
        };
        self.last = Some(value);

        let constant = self.count >= VOLUME_STREAK_LIMIT;
        if constant && !self.raised && !quiet {
            self.raised = true;
            StreakChange::Raised(self.count)
        } else if !constant && self.raised {
            self.raised = false;
            StreakChange::Cleared(self.count)
        } else {
            StreakChange::Unchanged
        }
    }
}

/// Collaborators a session is built from.
pub struct SessionDeps {
    pub media: Box<dyn MediaEngine>,
    pub monitor: Box<dyn QualityMonitor>,
    pub publisher: Arc<dyn Publisher>,
    pub timers: Box<dyn Timers>,
    pub ids: Box<dyn IdGenerator>,
    pub tone_player: Option<Box<dyn TonePlayer>>,
}

pub struct CallSession {
    options: CallOptions,
    direction: CallDirection,
    parameters: HashMap<String, String>,
    temp_call_sid: String,
    reconnect_token: Option<String>,

    phase: Phase,
    media_status: MediaStatus,
    signaling_status: SignalingStatus,

    channel: Option<SignalChannel>,
    media: Option<Box<dyn MediaEngine>>,
    monitor: Box<dyn QualityMonitor>,
    publisher: Arc<dyn Publisher>,
    timers: Box<dyn Timers>,
    ids: Box<dyn IdGenerator>,
    tone_player: Option<Box<dyn TonePlayer>>,

    listeners: HashSet<Listener>,
    teardown_pending: bool,

    reconnect: ReconnectPolicy,
    /// A `Reconnecting` event is waiting for its `Reconnected`.
    reconnect_episode: bool,

    dtmf: DtmfQueues,
    pending_messages: HashMap<String, UserMessage>,
    metrics: Vec<CallMetrics>,
    input_streak: VolumeStreak,
    output_streak: VolumeStreak,
    latest_input_volume: f64,
    latest_output_volume: f64,
    codec: Option<String>,
    warnings_timer: Option<TimerId>,
    accept_options: AcceptOptions,

    answered: bool,
    media_opened: bool,
    was_connected: bool,
    should_send_hangup: bool,
    cancelled: bool,
    rejected: bool,
    finalized: bool,

    events: VecDeque<CallEvent>,
}

impl CallSession {
    pub fn new(channel: SignalChannel, deps: SessionDeps, options: CallOptions) -> Self {
        let SessionDeps {
            mut media,
            monitor,
            publisher,
            timers,
            mut ids,
            tone_player,
        } = deps;

        let parameters = options.call_parameters.clone();
        let direction = if parameters.contains_key("CallSid") && options.reconnect_call_sid.is_none() {
            CallDirection::Incoming
        } else {
            CallDirection::Outgoing
        };
        if let Some(call_sid) = parameters.get("CallSid") {
            media.set_call_sid(call_sid);
        }

        let mut session = Self {
            direction,
            parameters,
            temp_call_sid: ids.temp_call_sid(),
            reconnect_token: options.reconnect_token.clone(),
            phase: Phase::Pending,
            media_status: MediaStatus::Pending,
            signaling_status: SignalingStatus::Pending,
            channel: Some(channel),
            media: Some(media),
            monitor,
            publisher,
            timers,
            ids,
            tone_player,
            listeners: Listener::INITIAL.into_iter().collect(),
            teardown_pending: false,
            reconnect: ReconnectPolicy::new(options.backoff.clone()),
            reconnect_episode: false,
            dtmf: DtmfQueues::default(),
            pending_messages: HashMap::new(),
            metrics: Vec::new(),
            input_streak: VolumeStreak::default(),
            output_streak: VolumeStreak::default(),
            latest_input_volume: 0.0,
            latest_output_volume: 0.0,
            codec: None,
            warnings_timer: None,
            accept_options: AcceptOptions::default(),
            answered: false,
            media_opened: false,
            was_connected: false,
            should_send_hangup: true,
            cancelled: false,
            rejected: false,
            finalized: false,
            events: VecDeque::new(),
            options,
        };

        match session.direction {
            CallDirection::Incoming => session.publish(Level::Info, "connection", "incoming", None),
            CallDirection::Outgoing => session.publish(
                Level::Info,
                "connection",
                "outgoing",
                Some(json!({
                    "preflight": session.options.preflight,
                    "reconnect": session.options.reconnect_token.is_some(),
                })),
            ),
        }

        session.monitor.disable_warnings();
        session.warnings_timer = Some(
            session
                .timers
                .schedule(session.options.warnings_delay, Timer::EnableWarnings),
        );
        info!(
            target: "Call/Session",
            "Created {} call {}",
            session.direction.as_str(),
            session.call_sid().unwrap_or(&session.temp_call_sid)
        );
        session
    }

    // Accessors

    pub fn status(&self) -> CallStatus {
        derive_status(self.phase, self.media_status, self.signaling_status)
    }

    pub fn media_status(&self) -> MediaStatus {
        self.media_status
    }

    pub fn signaling_status(&self) -> SignalingStatus {
        self.signaling_status
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.parameters.get("CallSid").map(String::as_str)
    }

    pub fn temp_call_sid(&self) -> &str {
        &self.temp_call_sid
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn custom_parameters(&self) -> &IndexMap<String, String> {
        &self.options.custom_parameters
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn caller_info(&self) -> Option<CallerInfo> {
        self.parameters.get("StirStatus").map(|status| CallerInfo {
            is_verified: status == STIR_VERIFIED,
        })
    }

    pub fn is_muted(&self) -> bool {
        self.media.as_ref().is_some_and(|m| m.is_muted())
    }

    /// Token an application can hand to a later session to resume this
    /// call. Only available while the server holds the call for us.
    pub fn connect_token(&self) -> Option<String> {
        let token = self.reconnect_token.as_ref()?;
        self.call_sid()?;
        let body = json!({
            "customParameters": self.options.custom_parameters,
            "parameters": self.parameters,
            "signalingReconnectToken": token,
        });
        Some(STANDARD.encode(urlencoding::encode(&body.to_string()).as_bytes()))
    }

    pub fn next_event(&mut self) -> Option<CallEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<CallEvent> {
        self.events.drain(..).collect()
    }

    // Caller operations

    pub fn accept(&mut self, options: AcceptOptions) {
        if self.status() != CallStatus::Pending {
            debug!(target: "Call/Session", "accept() ignored in status {}", self.status().as_str());
            return self.finish_turn();
        }
        info!(target: "Call/Session", "Accepting call");
        self.phase = Phase::Connecting;
        self.accept_options = options;
        if let Some(media) = self.media.as_mut() {
            media.open_input(&self.accept_options);
        }
        self.finish_turn();
    }

    pub fn reject(&mut self) {
        if self.status() != CallStatus::Pending {
            debug!(target: "Call/Session", "reject() ignored in status {}", self.status().as_str());
            return self.finish_turn();
        }
        info!(target: "Call/Session", "Rejecting call");
        self.rejected = true;
        let call_sid = self.call_sid().map(str::to_string);
        if let Some(channel) = self.channel.as_mut() {
            channel.reject(call_sid.as_deref());
        }
        if let Some(media) = self.media.as_mut() {
            media.reject(call_sid.as_deref());
        }
        self.publish(Level::Info, "connection", "rejected-by-local", None);
        self.detach_listeners();
        self.close_media();
        self.emit(CallEvent::Reject);
        self.finish_turn();
    }

    pub fn ignore(&mut self) {
        if self.status() != CallStatus::Pending {
            debug!(target: "Call/Session", "ignore() ignored in status {}", self.status().as_str());
            return self.finish_turn();
        }
        info!(target: "Call/Session", "Ignoring call");
        self.phase = Phase::Closed;
        let call_sid = self.call_sid().map(str::to_string);
        if let Some(media) = self.media.as_mut() {
            media.ignore(call_sid.as_deref());
        }
        self.publish(Level::Info, "connection", "ignored-by-local", None);
        self.finalize(false);
        self.finish_turn();
    }

    pub fn disconnect(&mut self) {
        self.disconnect_with(None, false);
        self.finish_turn();
    }

    pub fn mute(&mut self, should_mute: bool) {
        let change = self.media.as_mut().and_then(|media| {
            let was_muted = media.is_muted();
            media.set_muted(should_mute);
            let is_muted = media.is_muted();
            (was_muted != is_muted).then_some(is_muted)
        });
        if let Some(is_muted) = change {
            let name = if is_muted { "muted" } else { "unmuted" };
            self.publish(Level::Info, "connection", name, None);
            self.emit(CallEvent::Mute(is_muted));
        }
        self.finish_turn();
    }

    /// Sends DTMF digits. `w` inserts a pause.
    pub fn send_digits(&mut self, digits: &str) -> Result<(), CallError> {
        debug!(target: "Call/Session", "sendDigits: {digits}");
        validate_digits(digits)?;

        self.dtmf.push_sidetones(digits);
        if self.dtmf.sidetone_timer.is_none() {
            self.play_next_sidetone();
        }

        let native = self
            .media
            .as_mut()
            .and_then(|m| m.dtmf_sender())
            .map(|sender| sender.can_insert_dtmf());
        match native {
            Some(true) => {
                info!(target: "Call/Session", "Sending digits using the native DTMF sender");
                self.dtmf.push_chunks(digits);
                if self.dtmf.chunk_timer.is_none() {
                    self.insert_next_chunk();
                }
            }
            native => {
                if native == Some(false) {
                    info!(target: "Call/Session", "Native DTMF sender cannot insert DTMF");
                }
                info!(target: "Call/Session", "Sending digits over the signaling channel");
                let call_sid = self.call_sid().map(str::to_string);
                match self.channel.as_mut() {
                    Some(channel) if !channel.is_disconnected() => {
                        channel.dtmf(call_sid.as_deref(), digits);
                    }
                    _ => self.emit_error(VoiceError::with_message(
                        ErrorKind::GeneralConnectionError,
                        DTMF_DISCONNECTED_MESSAGE,
                    )),
                }
            }
        }

        self.finish_turn();
        Ok(())
    }

    /// Sends a user message and returns its correlation id.
    pub fn send_message(&mut self, message: UserMessage) -> Result<String, CallError> {
        let sent = self.publish_message(message);
        self.finish_turn();
        sent
    }

    fn publish_message(&mut self, mut message: UserMessage) -> Result<String, CallError> {
        message.validate()?;
        let Some(channel) = self.channel.as_mut() else {
            return Err(CallError::InvalidState(
                "Could not send CallMessage; Signaling channel is disconnected".to_string(),
            ));
        };
        let Some(call_sid) = self.parameters.get("CallSid").cloned() else {
            return Err(CallError::InvalidState(
                "Could not send CallMessage; Call has no CallSid".to_string(),
            ));
        };

        let voice_event_sid = self.ids.voice_event_sid();
        message.voice_event_sid = Some(voice_event_sid.clone());
        channel.send_message(
            &call_sid,
            &message.content,
            message.content_type.as_deref(),
            &message.message_type,
            &voice_event_sid,
        );
        self.pending_messages.insert(voice_event_sid.clone(), message);
        debug!(target: "Call/Session", "Sent message {voice_event_sid}");
        Ok(voice_event_sid)
    }

    pub fn post_feedback(
        &mut self,
        score: Option<u8>,
        issue: Option<FeedbackIssue>,
    ) -> Result<(), CallError> {
        match score {
            None => self.post(Level::Info, "feedback", "received-none", None, true),
            Some(score) if (1..=5).contains(&score) => self.post(
                Level::Info,
                "feedback",
                "received",
                Some(json!({
                    "issue_name": issue.map(FeedbackIssue::as_str),
                    "quality_score": score,
                })),
                true,
            ),
            Some(_) => {
                return Err(CallError::InvalidArgument(
                    "Feedback score must be one of: 1, 2, 3, 4, 5".to_string(),
                ));
            }
        }
        Ok(())
    }

    // Inbound completions

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match self.channel.as_mut() {
            Some(channel) => channel.handle_transport_event(event),
            None => trace!(target: "Call/Session", "Channel released, dropping {event:?}"),
        }
        self.finish_turn();
    }

    pub fn handle_media_event(&mut self, event: MediaEvent) {
        if self.phase == Phase::Closed {
            trace!(target: "Call/Session", "Call closed, dropping media event {event:?}");
            return self.finish_turn();
        }

        match event {
            MediaEvent::InputReady => self.on_input_ready(),
            MediaEvent::InputFailed(e) => self.on_input_failed(e),
            MediaEvent::LocalOffer { sdp } => self.on_local_offer(&sdp),
            MediaEvent::LocalAnswer { sdp } => {
                let call_sid = self.hangup_call_sid();
                if let Some(channel) = self.channel.as_mut() {
                    channel.answer(&sdp, &call_sid);
                }
            }
            MediaEvent::RestartOffer { sdp } => {
                let call_sid = self.hangup_call_sid();
                if let Some(channel) = self.channel.as_mut() {
                    channel.reinvite(&sdp, &call_sid);
                }
            }
            MediaEvent::Negotiated {
                codec,
                codec_params,
            } => self.on_negotiated(codec, codec_params),
            MediaEvent::Opened => self.on_media_open(),
            MediaEvent::Disconnected { message } => {
                warn!(target: "Call/Session", "ICE connectivity lost: {message}");
                self.publish(
                    Level::Warning,
                    "network-quality-warning-raised",
                    ICE_CONNECTIVITY_LOST,
                    Some(json!({ "message": message })),
                );
                self.emit(CallEvent::Warning {
                    name: ICE_CONNECTIVITY_LOST.to_string(),
                    data: None,
                });
                self.on_media_failure(MediaFailure::ConnectionDisconnected);
            }
            MediaEvent::Failed { message } => {
                warn!(target: "Call/Session", "Media connection failed: {message}");
                self.on_media_failure(MediaFailure::ConnectionFailed);
            }
            MediaEvent::Reconnected { message } => {
                info!(target: "Call/Session", "ICE connectivity restored: {message}");
                self.publish(
                    Level::Info,
                    "network-quality-warning-cleared",
                    ICE_CONNECTIVITY_LOST,
                    Some(json!({ "message": message })),
                );
                self.emit(CallEvent::WarningCleared {
                    name: ICE_CONNECTIVITY_LOST.to_string(),
                });
                self.on_media_reconnected();
            }
            MediaEvent::IceGatheringFailed { reason } => {
                self.publish(Level::Warning, "ice-gathering-state", &reason, None);
                self.on_media_failure(MediaFailure::IceGatheringFailed);
            }
            MediaEvent::Error(e) => self.on_media_error(e),
            MediaEvent::Volume {
                input,
                output,
                internal_input,
                internal_output,
            } => self.on_volume(input, output, internal_input, internal_output),
            MediaEvent::StateChanged { group, state } => {
                let level = if state == "failed" {
                    Level::Error
                } else {
                    Level::Debug
                };
                self.publish(level, group.as_str(), &state, None);
            }
            MediaEvent::Closed => self.on_media_closed(),
        }
        self.finish_turn();
    }

    pub fn handle_monitor_event(&mut self, event: MonitorEvent) {
        if self.phase == Phase::Closed {
            trace!(target: "Call/Session", "Call closed, dropping monitor event");
            return self.finish_turn();
        }

        match event {
            MonitorEvent::Sample(sample) => self.on_sample(sample),
            MonitorEvent::Warning(warning) => {
                if matches!(warning.metric, Metric::BytesSent | Metric::BytesReceived) {
                    self.on_media_failure(MediaFailure::LowBytes);
                }
                self.reemit_warning(warning, false);
            }
            MonitorEvent::WarningCleared(warning) => self.reemit_warning(warning, true),
        }
        self.finish_turn();
    }

    pub fn handle_timer(&mut self, id: TimerId, timer: Timer) {
        match timer {
            Timer::ReconnectBackoff if self.reconnect.take_fired(id) => self.on_backoff_ready(),
            Timer::Sidetone if self.dtmf.sidetone_timer == Some(id) => {
                self.dtmf.sidetone_timer = None;
                self.play_next_sidetone();
            }
            Timer::DtmfChunk if self.dtmf.chunk_timer == Some(id) => {
                self.dtmf.chunk_timer = None;
                self.insert_next_chunk();
            }
            Timer::EnableWarnings if self.warnings_timer == Some(id) => {
                self.warnings_timer = None;
                debug!(target: "Call/Session", "Enabling quality warnings");
                self.monitor.enable_warnings();
            }
            _ => trace!(target: "Call/Session", "Ignoring stale {timer:?} timer {id:?}"),
        }
        self.finish_turn();
    }

    // Turn bookkeeping

    /// Completes an entry point: dispatches what the channel raised, repeats a
    /// pending listener teardown and releases collaborators once closed.
    fn finish_turn(&mut self) {
        while let Some(event) = self.channel.as_mut().and_then(SignalChannel::next_event) {
            self.on_signal_event(event);
        }

        if self.teardown_pending {
            self.teardown_pending = false;
            if !self.listeners.is_empty() {
                debug!(target: "Call/Session", "Dropping listeners re-attached during teardown");
            }
            self.listeners.clear();
        }

        if self.phase == Phase::Closed {
            self.release();
        }
    }

    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!(target: "Call/Session", "Releasing signaling channel");
            channel.destroy();
        }
        self.media = None;
    }

    fn attach(&mut self, listener: Listener) {
        self.listeners.insert(listener);
    }

    fn detach_listeners(&mut self) {
        self.listeners.clear();
        self.teardown_pending = true;
    }

    fn emit(&mut self, event: CallEvent) {
        trace!(target: "Call/Session", "#{event:?}");
        self.events.push_back(event);
    }

    fn emit_error(&mut self, error: VoiceError) {
        self.publish(
            Level::Error,
            "connection",
            "error",
            Some(json!({ "code": error.code, "message": error.message })),
        );
        self.emit(CallEvent::Error(error));

        // Queued traffic is replayed on the next open, and its replies must
        // still reach us.
        let abandoned = match self.channel.as_ref() {
            None => true,
            Some(channel) => channel.is_disconnected() && channel.queued() == 0,
        };
        if abandoned && self.signaling_status != SignalingStatus::Reconnecting {
            self.detach_listeners();
        }
    }

    fn context(&self) -> CallContext {
        CallContext {
            call_sid: self.call_sid().map(str::to_string),
            temp_call_sid: self.temp_call_sid.clone(),
            direction: self.direction,
            gateway: self.gateway(),
        }
    }

    fn gateway(&self) -> Option<String> {
        self.channel
            .as_ref()
            .and_then(SignalChannel::gateway)
            .map(str::to_string)
            .or_else(|| self.options.gateway.clone())
    }

    fn publish(&self, level: Level, group: &str, name: &str, payload: Option<Value>) {
        self.post(level, group, name, payload, false);
    }

    fn post(&self, level: Level, group: &str, name: &str, payload: Option<Value>, force: bool) {
        self.publisher.post(TelemetryEvent {
            level,
            group: group.to_string(),
            name: name.to_string(),
            payload,
            force,
            context: self.context(),
        });
    }

    /// Id used on the wire before the server has assigned one.
    fn hangup_call_sid(&self) -> String {
        self.call_sid().unwrap_or(&self.temp_call_sid).to_string()
    }

    fn outbound_call_sid(&self) -> String {
        self.options
            .reconnect_call_sid
            .clone()
            .unwrap_or_else(|| self.temp_call_sid.clone())
    }

    fn adopt_call_sid(&mut self, call_sid: Option<&str>) {
        let Some(call_sid) = call_sid.filter(|sid| !sid.is_empty()) else {
            return;
        };
        if self.call_sid() != Some(call_sid) {
            debug!(target: "Call/Session", "Adopting call sid {call_sid}");
            self.parameters
                .insert("CallSid".to_string(), call_sid.to_string());
            if let Some(media) = self.media.as_mut() {
                media.set_call_sid(call_sid);
            }
        }
    }

    fn encoded_custom_parameters(&self) -> String {
        self.options
            .custom_parameters
            .iter()
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    // Accept continuation

    fn on_input_ready(&mut self) {
        self.publish(
            Level::Info,
            "get-user-media",
            "succeeded",
            Some(json!({ "data": { "audioConstraints": self.accept_options.audio_constraints } })),
        );
        self.connect();
    }

    fn on_input_failed(&mut self, input_error: InputError) {
        let name = if input_error.is_permission_denied() {
            "denied"
        } else {
            "failed"
        };
        warn!(target: "Call/Session", "Could not open input: {} ({})", input_error.message, input_error.name);
        self.publish(
            Level::Error,
            "get-user-media",
            name,
            Some(json!({
                "data": {
                    "audioConstraints": self.accept_options.audio_constraints,
                    "error": {
                        "code": input_error.code,
                        "message": input_error.message,
                        "name": input_error.name,
                    },
                },
            })),
        );
        self.disconnect_with(None, false);
        self.emit_error(input_error.to_voice_error());
    }

    fn connect(&mut self) {
        if self.phase != Phase::Connecting {
            debug!(target: "Call/Session", "Call is no longer connecting, abandoning accept");
            self.detach_listeners();
            self.close_media();
            return;
        }

        self.attach(Listener::Hangup);
        let result = match self.direction {
            CallDirection::Incoming => {
                self.answered = true;
                self.attach(Listener::Answer);
                let call_sid = self.hangup_call_sid();
                match self.media.as_mut() {
                    Some(media) => {
                        media.answer_incoming_call(&call_sid, self.options.offer_sdp.as_deref())
                    }
                    None => Ok(()),
                }
            }
            CallDirection::Outgoing => {
                let params = self.encoded_custom_parameters();
                self.attach(Listener::Answer);
                let call_sid = self.outbound_call_sid();
                match self.media.as_mut() {
                    Some(media) => media.make_outgoing_call(
                        &params,
                        self.reconnect_token.as_deref(),
                        &call_sid,
                    ),
                    None => Ok(()),
                }
            }
        };

        if let Err(e) = result {
            self.on_media_error(e);
        }
    }

    fn on_local_offer(&mut self, sdp: &str) {
        let call_sid = self.outbound_call_sid();
        let params = self.encoded_custom_parameters();
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        match self.reconnect_token.as_deref() {
            Some(token) => channel.reconnect(sdp, &call_sid, token),
            None => channel.invite(sdp, &call_sid, Some(&params)),
        }
    }

    fn on_negotiated(&mut self, codec: Option<String>, codec_params: Option<String>) {
        let name = match self.direction {
            CallDirection::Incoming => "accepted-by-local",
            CallDirection::Outgoing => "accepted-by-remote",
        };
        self.publish(Level::Info, "connection", name, None);
        self.publish(
            Level::Info,
            "settings",
            "codec",
            Some(json!({ "codec_params": codec_params, "selected_codec": codec })),
        );
        self.codec = codec;
        self.monitor.enable();
    }

    fn on_media_open(&mut self) {
        match self.phase {
            Phase::Established => {}
            Phase::Connecting | Phase::Ringing => {
                if let Some(media) = self.media.as_mut() {
                    let muted = media.is_muted();
                    media.set_muted(muted);
                }
                self.media_opened = true;
                if self.media_status == MediaStatus::Pending {
                    self.media_status = MediaStatus::Open;
                }
                self.maybe_transition_to_open();
            }
            Phase::Pending | Phase::Closed => {
                debug!(target: "Call/Session", "Media opened for a call that is not connecting, closing it");
                self.close_media();
            }
        }
    }

    fn maybe_transition_to_open(&mut self) {
        if !self.answered {
            return;
        }
        if self.signaling_status == SignalingStatus::Pending {
            self.signaling_status = SignalingStatus::Open;
        }
        if self.media_opened && matches!(self.phase, Phase::Connecting | Phase::Ringing) {
            self.phase = Phase::Established;
            if !self.was_connected {
                self.was_connected = true;
                info!(target: "Call/Session", "Call accepted");
                self.emit(CallEvent::Accept);
            }
        }
    }

    /// Raises `Reconnected` once both halves are back after a
    /// `Reconnecting`.
    fn settle_reconnection(&mut self) {
        let status = self.status();
        if self.reconnect_episode && status != CallStatus::Reconnecting && status != CallStatus::Closed {
            self.reconnect_episode = false;
            info!(target: "Call/Session", "Call reconnected");
            self.publish(Level::Info, "connection", "reconnected", None);
            self.emit(CallEvent::Reconnected);
        }
    }

    // Signal events

    fn on_signal_event(&mut self, event: SignalEvent) {
        let Some(listener) = Listener::for_event(&event) else {
            trace!(target: "Call/Session", "Not handling '{}' signal", event.tag());
            return;
        };
        if !self.listeners.contains(&listener) {
            trace!(target: "Call/Session", "No listener for '{}' signal", event.tag());
            return;
        }

        match event {
            SignalEvent::Ack(payload) => self.on_ack(payload),
            SignalEvent::Answer(payload) => self.on_answer(payload),
            SignalEvent::Cancel(payload) => self.on_cancel(payload),
            SignalEvent::Connected(_) => self.on_connected(),
            SignalEvent::Error(payload) => self.on_signaling_error(payload),
            SignalEvent::Hangup(payload) => self.on_hangup(payload),
            SignalEvent::Message(payload) => self.on_message(payload),
            SignalEvent::Ringing(payload) => self.on_ringing(payload),
            SignalEvent::TransportClose => self.on_transport_close(),
            other => trace!(target: "Call/Session", "Unhandled '{}' signal", other.tag()),
        }
    }

    fn on_ack(&mut self, payload: AckPayload) {
        if payload.callsid.as_deref() != self.call_sid() {
            warn!(target: "Call/Session", "Received an ack from a different callsid: {:?}", payload.callsid);
            return;
        }
        if payload.acktype.as_deref() == Some("message") {
            if let Some(voice_event_sid) = payload.voiceeventsid {
                self.on_message_sent(&voice_event_sid);
            }
        }
    }

    fn on_message_sent(&mut self, voice_event_sid: &str) {
        let Some(message) = self.pending_messages.remove(voice_event_sid) else {
            warn!(target: "Call/Session", "Received a message ack for an unknown voiceEventSid: {voice_event_sid}");
            return;
        };
        self.publish(
            Level::Info,
            "call-message",
            &message.message_type,
            Some(json!({
                "content_type": message.content_type(),
                "event_type": "sent",
                "voice_event_sid": voice_event_sid,
            })),
        );
        self.emit(CallEvent::MessageSent(message));
    }

    fn on_message(&mut self, payload: MessagePayload) {
        if payload.callsid.as_deref() != self.call_sid() {
            warn!(target: "Call/Session", "Received a message from a different callsid: {:?}", payload.callsid);
            return;
        }
        self.publish(
            Level::Info,
            "call-message",
            &payload.messagetype,
            Some(json!({
                "content_type": payload.contenttype,
                "event_type": "received",
                "voice_event_sid": payload.voiceeventsid,
            })),
        );
        self.emit(CallEvent::MessageReceived(UserMessage {
            content: payload.content,
            content_type: payload.contenttype,
            message_type: payload.messagetype,
            voice_event_sid: payload.voiceeventsid,
        }));
    }

    fn on_answer(&mut self, payload: AnswerPayload) {
        if let Some(token) = payload.reconnect.filter(|t| !t.is_empty()) {
            self.reconnect_token = Some(token);
        }

        let reconnecting = self.status() == CallStatus::Reconnecting;
        if self.answered && !reconnecting {
            trace!(target: "Call/Session", "Ignoring duplicate answer");
            return;
        }

        self.adopt_call_sid(payload.callsid.as_deref());
        if let Some(sdp) = payload.sdp.as_deref() {
            if self.direction == CallDirection::Outgoing || reconnecting {
                let result = match self.media.as_mut() {
                    Some(media) => media.process_answer(sdp),
                    None => Ok(()),
                };
                if let Err(e) = result {
                    return self.on_media_error(e);
                }
            }
        }

        self.answered = true;
        if self.signaling_status == SignalingStatus::Reconnecting {
            info!(target: "Call/Session", "Signaling connection reconnected");
        }
        self.signaling_status = SignalingStatus::Open;
        self.maybe_transition_to_open();
        self.settle_reconnection();
    }

    fn on_cancel(&mut self, payload: CancelPayload) {
        if payload.callsid.is_none() || payload.callsid.as_deref() != self.call_sid() {
            trace!(target: "Call/Session", "Ignoring cancel for {:?}", payload.callsid);
            return;
        }
        info!(target: "Call/Session", "Call cancelled by the remote party");
        self.cancelled = true;
        self.publish(Level::Info, "connection", "cancel", None);
        self.detach_listeners();
        self.close_media();
        self.emit(CallEvent::Cancel);
    }

    fn on_connected(&mut self) {
        let Some(token) = self.reconnect_token.clone() else {
            return;
        };
        let Some(sdp) = self.media.as_ref().and_then(|m| m.local_description()) else {
            return;
        };
        info!(target: "Call/Session", "Signaling connected, resuming call with reconnect token");
        let call_sid = self.hangup_call_sid();
        if let Some(channel) = self.channel.as_mut() {
            channel.reconnect(&sdp, &call_sid, &token);
        }
    }

    fn on_hangup(&mut self, payload: HangupPayload) {
        if self.status() == CallStatus::Closed {
            return;
        }
        if let Some(call_sid) = payload.callsid.as_deref() {
            if self.call_sid() != Some(call_sid) && self.temp_call_sid != call_sid {
                warn!(target: "Call/Session", "Ignoring hangup for a different callsid: {call_sid}");
                return;
            }
        }

        if let Some(e) = payload.error.as_ref() {
            let error = match e.code.and_then(ErrorKind::from_code) {
                Some(kind) => VoiceError::with_message(kind, e.message.clone()),
                None => VoiceError::with_message(
                    ErrorKind::GeneralConnectionError,
                    HANGUP_ERROR_MESSAGE,
                ),
            };
            error!(target: "Call/Session", "Received an error from the gateway: {error}");
            self.emit_error(error);
        }

        self.should_send_hangup = false;
        self.publish(Level::Info, "connection", "disconnected-by-remote", None);
        self.disconnect_with(None, true);
        self.detach_listeners();
    }

    fn on_ringing(&mut self, payload: RingingPayload) {
        self.adopt_call_sid(payload.callsid.as_deref());
        if !matches!(self.status(), CallStatus::Connecting | CallStatus::Ringing) {
            debug!(target: "Call/Session", "Dropping out-of-order ringing");
            return;
        }

        let has_early_media = payload.sdp.is_some();
        if let Some(sdp) = payload.sdp.as_deref() {
            let result = match self.media.as_mut() {
                Some(media) => media.process_answer(sdp),
                None => Ok(()),
            };
            if let Err(e) = result {
                return self.on_media_error(e);
            }
        }
        self.phase = Phase::Ringing;
        self.publish(
            Level::Info,
            "connection",
            "outgoing-ringing",
            Some(json!({ "hasEarlyMedia": has_early_media })),
        );
        self.emit(CallEvent::Ringing { has_early_media });
    }

    fn on_signaling_error(&mut self, payload: ErrorPayload) {
        if let Some(call_sid) = payload.callsid.as_deref() {
            if self.call_sid() != Some(call_sid) {
                warn!(target: "Call/Session", "Received an error from a different callsid: {call_sid}");
                return;
            }
        }

        if let Some(voice_event_sid) = payload.voiceeventsid.as_deref() {
            if self.pending_messages.contains_key(voice_event_sid) {
                return self.on_message_failed(voice_event_sid, payload.error.as_ref());
            }
        }

        if payload.callsid.is_none()
            && (!self.status().is_live() || self.signaling_status == SignalingStatus::Reconnecting)
        {
            warn!(target: "Call/Session", "Signaling channel error: {:?}", payload.error);
            return;
        }

        let error = match payload.error {
            Some(ServerError {
                typed: Some(typed), ..
            }) => typed,
            Some(e) => e.resolve(),
            None => VoiceError::new(ErrorKind::UnknownError),
        };
        error!(target: "Call/Session", "Received a signaling error: {error}");
        self.emit_error(error);
    }

    fn on_message_failed(&mut self, voice_event_sid: &str, error: Option<&ServerError>) {
        self.pending_messages.remove(voice_event_sid);
        let error = error.map_or_else(
            || VoiceError::new(ErrorKind::UnknownError),
            ServerError::resolve,
        );
        warn!(target: "Call/Session", "Message {voice_event_sid} failed: {error}");
        self.publish(
            Level::Error,
            "call-message",
            "error",
            Some(json!({
                "code": error.code,
                "message": error.message,
                "voice_event_sid": voice_event_sid,
            })),
        );
    }

    fn on_transport_close(&mut self) {
        error!(target: "Call/Session", "Received transportClose from the signaling channel");
        self.emit(CallEvent::TransportClose);

        if self.reconnect_token.is_some() {
            self.signaling_status = SignalingStatus::Reconnecting;
            warn!(target: "Call/Session", "Signaling connection lost, waiting for it to come back");
            self.reconnect_episode = true;
            self.emit(CallEvent::Reconnecting(VoiceError::new(
                ErrorKind::SignalingConnectionDisconnected,
            )));
        } else {
            info!(target: "Call/Session", "No reconnect token, ending call");
            self.signaling_status = SignalingStatus::Closed;
            self.should_send_hangup = false;
            self.detach_listeners();
            self.close_media();
        }
    }

    // Media failures and recovery

    fn on_media_failure(&mut self, failure: MediaFailure) {
        let observes_restart = self.media.as_ref().is_some_and(|m| m.observes_ice_restart());
        if !observes_restart && failure == MediaFailure::ConnectionFailed {
            warn!(target: "Call/Session", "ICE restart completion can't be observed, giving up on the media connection");
            return self.media_interrupted();
        }

        if !self.status().is_live() {
            trace!(target: "Call/Session", "Ignoring {failure:?} in status {}", self.status().as_str());
            return;
        }

        if self.media_status == MediaStatus::Reconnecting {
            if failure.ends_ice_cycle() {
                if self.reconnect.ceiling_exceeded(self.timers.now()) {
                    warn!(target: "Call/Session", "Exceeded max ICE retries");
                    return self.media_interrupted();
                }
                match self.reconnect.retry(self.timers.as_mut()) {
                    Ok(delay) => debug!(target: "Call/Reconnect", "Next ICE restart in {delay:?}"),
                    Err(e) => debug!(target: "Call/Reconnect", "Ignoring {failure:?}: {e}"),
                }
            }
            return;
        }

        let ice_disconnected = self.media.as_ref().is_some_and(|m| m.is_ice_disconnected());
        let low_bytes_warning = self
            .monitor
            .has_active_warning(Metric::BytesSent, ThresholdKind::Min)
            || self
                .monitor
                .has_active_warning(Metric::BytesReceived, ThresholdKind::Min);

        let escalate = (failure == MediaFailure::LowBytes && ice_disconnected)
            || (failure == MediaFailure::ConnectionDisconnected && low_bytes_warning)
            || failure.ends_ice_cycle();
        if !escalate {
            debug!(target: "Call/Session", "{failure:?} does not warrant a reconnect yet");
            return;
        }

        let error = VoiceError::with_message(ErrorKind::MediaConnectionError, MEDIA_FAILED_MESSAGE);
        warn!(target: "Call/Session", "ICE connection disconnected, reconnecting media");
        self.publish(
            Level::Warning,
            "connection",
            "error",
            Some(json!({ "code": error.code, "message": error.message })),
        );
        self.publish(Level::Info, "connection", "reconnecting", None);

        self.media_status = MediaStatus::Reconnecting;
        match self.reconnect.begin(self.timers.as_mut()) {
            Ok(delay) => debug!(target: "Call/Reconnect", "First ICE restart in {delay:?}"),
            Err(e) => debug!(target: "Call/Reconnect", "Could not schedule ICE restart: {e}"),
        }
        self.reconnect_episode = true;
        self.emit(CallEvent::Reconnecting(error));
    }

    fn media_interrupted(&mut self) {
        self.on_media_error(MediaError {
            error: VoiceError::with_message(ErrorKind::MediaConnectionError, MEDIA_INTERRUPTED_MESSAGE),
            disconnect: true,
        });
    }

    fn on_backoff_ready(&mut self) {
        if self.media_status != MediaStatus::Reconnecting {
            return;
        }
        info!(target: "Call/Reconnect", "Requesting ICE restart (attempt {})", self.reconnect.attempts());
        if let Some(media) = self.media.as_mut() {
            media.ice_restart();
        }
    }

    fn on_media_reconnected(&mut self) {
        if self.media_status != MediaStatus::Reconnecting {
            return;
        }
        info!(target: "Call/Session", "Media connection reconnected");
        self.media_status = MediaStatus::Open;
        self.reconnect.finish(self.timers.as_mut());
        self.settle_reconnection();
    }

    fn on_media_error(&mut self, e: MediaError) {
        if e.disconnect {
            self.disconnect_with(Some(e.error.message.clone()), false);
        }
        self.emit_error(e.error);
    }

    // Teardown

    fn disconnect_with(&mut self, message: Option<String>, remote: bool) {
        if !self.status().is_live() {
            return;
        }
        info!(target: "Call/Session", "Disconnecting call");

        if self.should_send_hangup {
            let call_sid = self.hangup_call_sid();
            match self.channel.as_mut() {
                Some(channel) if !channel.is_disconnected() => {
                    channel.hangup(&call_sid, message.as_deref());
                }
                _ => debug!(target: "Call/Session", "Signaling channel is down, not sending hangup"),
            }
        }

        self.detach_listeners();
        self.close_media();
        if !remote {
            self.publish(Level::Info, "connection", "disconnected-by-local", None);
        }
    }

    fn close_media(&mut self) {
        if let Some(media) = self.media.as_mut() {
            media.close();
        }
        self.on_media_closed();
    }

    fn on_media_closed(&mut self) {
        let announce = !self.cancelled && !self.rejected;
        self.finalize(announce);
    }

    /// Terminal transition to Closed. Runs once.
    fn finalize(&mut self, announce: bool) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.phase = Phase::Closed;
        self.monitor.disable();
        self.flush_metrics();
        self.cancel_timers();
        info!(target: "Call/Session", "Call closed");
        if announce {
            self.emit(CallEvent::Disconnect);
        }
        self.detach_listeners();
    }

    fn cancel_timers(&mut self) {
        self.reconnect.finish(self.timers.as_mut());
        if let Some(id) = self.warnings_timer.take() {
            self.timers.cancel(id);
        }
        for id in self.dtmf.clear() {
            self.timers.cancel(id);
        }
    }

    // DTMF

    fn play_next_sidetone(&mut self) {
        let Some(slot) = self.dtmf.sidetones.pop_front() else {
            return;
        };
        if let (Some(tone), Some(player)) = (slot, self.tone_player.as_mut()) {
            player.play(tone);
        }
        if !self.dtmf.sidetones.is_empty() {
            self.dtmf.sidetone_timer = Some(self.timers.schedule(SIDETONE_INTERVAL, Timer::Sidetone));
        }
    }

    fn insert_next_chunk(&mut self) {
        let Some(chunk) = self.dtmf.chunks.pop_front() else {
            return;
        };
        if !chunk.is_empty() {
            match self.media.as_mut().and_then(|m| m.dtmf_sender()) {
                Some(sender) => sender.insert_dtmf(&chunk, TONE_DURATION, INTER_TONE_GAP),
                None => warn!(target: "Call/Session", "DTMF sender went away, dropping digits {chunk}"),
            }
        }
        if !self.dtmf.chunks.is_empty() {
            self.dtmf.chunk_timer = Some(self.timers.schedule(PAUSE_DURATION, Timer::DtmfChunk));
        }
    }

    // Quality

    fn on_volume(&mut self, input: f64, output: f64, internal_input: f64, internal_output: f64) {
        self.monitor.add_volumes(
            internal_input / 255.0 * 32767.0,
            internal_output / 255.0 * 32767.0,
        );

        // Silence is expected while muted.
        let muted = self.is_muted();
        let input_change = self.input_streak.observe(input, muted);
        let output_change = self.output_streak.observe(output, false);
        self.report_constant_level(CONSTANT_INPUT_LEVEL, input_change);
        self.report_constant_level(CONSTANT_OUTPUT_LEVEL, output_change);

        self.latest_input_volume = input;
        self.latest_output_volume = output;
        self.emit(CallEvent::Volume { input, output });
    }

    fn report_constant_level(&mut self, name: &str, change: StreakChange) {
        let (count, cleared) = match change {
            StreakChange::Raised(count) => (count, false),
            StreakChange::Cleared(count) => (count, true),
            StreakChange::Unchanged => return,
        };
        self.emit_warning(
            "audio-level-",
            name,
            f64::from(VOLUME_STREAK_LIMIT),
            &WarningValue::Single(f64::from(count)),
            cleared,
            None,
        );
    }

    fn reemit_warning(&mut self, warning: Warning, cleared: bool) {
        let name = warning.external_name();
        if name == CONSTANT_INPUT_LEVEL && self.is_muted() {
            return;
        }
        let threshold = warning.threshold.value;
        let value = warning.value.clone();
        let data = (!cleared).then_some(warning.clone());
        self.emit_warning(warning.metric.group_prefix(), &name, threshold, &value, cleared, data);
    }

    fn emit_warning(
        &mut self,
        group_prefix: &str,
        name: &str,
        threshold: f64,
        value: &WarningValue,
        cleared: bool,
        data: Option<Warning>,
    ) {
        let group = format!(
            "{group_prefix}warning-{}",
            if cleared { "cleared" } else { "raised" }
        );
        let level = if cleared || name == CONSTANT_OUTPUT_LEVEL {
            Level::Info
        } else {
            Level::Warning
        };
        let payload = match value {
            WarningValue::Single(value) => json!({ "threshold": threshold, "value": value }),
            WarningValue::Series(values) => json!({
                "threshold": threshold,
                "values": values.iter().copied().map(round2).collect::<Vec<_>>(),
            }),
        };
        self.publish(level, &group, name, Some(json!({ "data": payload })));

        // Output level readings are too unreliable to surface.
        if name == CONSTANT_OUTPUT_LEVEL {
            return;
        }
        if cleared {
            debug!(target: "Call/Session", "#warning-cleared {name}");
            self.emit(CallEvent::WarningCleared {
                name: name.to_string(),
            });
        } else {
            debug!(target: "Call/Session", "#warning {name}");
            self.emit(CallEvent::Warning {
                name: name.to_string(),
                data,
            });
        }
    }

    fn on_sample(&mut self, sample: Sample) {
        if sample.codec_name.is_some() {
            self.codec = sample.codec_name.clone();
        }
        self.metrics.push(CallMetrics {
            sample: sample.clone(),
            input_volume: self.latest_input_volume,
            output_volume: self.latest_output_volume,
        });
        if self.metrics.len() >= self.options.metrics_batch_size {
            self.flush_metrics();
        }
        self.emit(CallEvent::Sample(sample));
    }

    fn flush_metrics(&mut self) {
        if self.metrics.is_empty() {
            return;
        }
        let records: Vec<MetricRecord> = self.metrics.drain(..).map(|m| MetricRecord::from(&m)).collect();
        let mut custom_fields = json!({
            "call_sid": self.call_sid(),
            "direction": self.direction.as_str(),
            "dscp": self.options.dscp,
            "sdk_version": RELEASE_VERSION,
        });
        if let Some(gateway) = self.gateway() {
            custom_fields["gateway"] = json!(gateway);
        }
        debug!(target: "Call/Session", "Publishing {} metric samples", records.len());
        self.publisher.post_metrics(MetricsBatch {
            group: "quality-metrics-samples".to_string(),
            name: "metrics-sample".to_string(),
            records,
            custom_fields,
            context: self.context(),
        });
    }
}
