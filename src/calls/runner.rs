//! Async driver for a [`CallSession`].
//!
//! The runner owns the session and serializes everything that can touch it:
//! application commands from [`CallHandle`]s, timer firings, transport frames
//! and media/monitor callbacks. Session events are fanned out on a broadcast
//! channel.

use log::{debug, info, trace};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::dtmf::TonePlayer;
use super::events::CallEvent;
use super::media::{AcceptOptions, MediaEngine, MediaEvent};
use super::message::{IdGenerator, UserMessage};
use super::session::{CallSession, FeedbackIssue, SessionDeps};
use super::state::{CallDirection, CallStatus};
use super::timer::{Timer, TimerId, TokioTimers};
use crate::config::CallOptions;
use crate::error::CallError;
use crate::quality::{MonitorEvent, QualityMonitor};
use crate::signaling::SignalChannel;
use crate::telemetry::Publisher;
use crate::transport::TransportEvent;

const EVENT_CAPACITY: usize = 100;
const COMMAND_CAPACITY: usize = 32;

/// Everything a runner needs to drive one call.
pub struct CallSetup {
    pub channel: SignalChannel,
    pub transport_events: mpsc::Receiver<TransportEvent>,
    pub media: Box<dyn MediaEngine>,
    pub media_events: mpsc::UnboundedReceiver<MediaEvent>,
    pub monitor: Box<dyn QualityMonitor>,
    pub monitor_events: mpsc::UnboundedReceiver<MonitorEvent>,
    pub publisher: Arc<dyn Publisher>,
    pub ids: Box<dyn IdGenerator>,
    pub tone_player: Option<Box<dyn TonePlayer>>,
    pub options: CallOptions,
}

/// Point-in-time view of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub direction: CallDirection,
    pub call_sid: Option<String>,
    pub temp_call_sid: String,
    pub is_muted: bool,
    pub codec: Option<String>,
    pub connect_token: Option<String>,
}

#[derive(Debug)]
enum CallCommand {
    Accept(AcceptOptions),
    Disconnect,
    Reject,
    Ignore,
    Mute(bool),
    SendDigits {
        digits: String,
        response_tx: oneshot::Sender<Result<(), CallError>>,
    },
    SendMessage {
        message: UserMessage,
        response_tx: oneshot::Sender<Result<String, CallError>>,
    },
    PostFeedback {
        score: Option<u8>,
        issue: Option<FeedbackIssue>,
        response_tx: oneshot::Sender<Result<(), CallError>>,
    },
    Snapshot {
        response_tx: oneshot::Sender<CallSnapshot>,
    },
}

/// Broadcast sender shared with handles so they can subscribe. The runner
/// takes it on exit, which closes every subscription.
type EventSlot = Arc<Mutex<Option<broadcast::Sender<CallEvent>>>>;

pub struct CallRunner {
    session: CallSession,
    commands: mpsc::Receiver<CallCommand>,
    timer_events: mpsc::UnboundedReceiver<(TimerId, Timer)>,
    transport_events: mpsc::Receiver<TransportEvent>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    monitor_events: mpsc::UnboundedReceiver<MonitorEvent>,
    events: EventSlot,
}

impl CallRunner {
    /// Must be called inside a tokio runtime.
    pub fn new(setup: CallSetup) -> (Self, CallHandle) {
        let (timers, timer_events) = TokioTimers::new();
        let session = CallSession::new(
            setup.channel,
            SessionDeps {
                media: setup.media,
                monitor: setup.monitor,
                publisher: setup.publisher,
                timers: Box::new(timers),
                ids: setup.ids,
                tone_player: setup.tone_player,
            },
            setup.options,
        );

        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let events = Arc::new(Mutex::new(Some(event_tx)));

        let runner = Self {
            session,
            commands,
            timer_events,
            transport_events: setup.transport_events,
            media_events: setup.media_events,
            monitor_events: setup.monitor_events,
            events: events.clone(),
        };
        let handle = CallHandle {
            commands: command_tx,
            events,
        };
        (runner, handle)
    }

    /// Drives the session until the call is closed.
    pub async fn run(mut self) {
        info!(target: "Call/Runner", "Call runner started for {}", self.session.temp_call_sid());
        self.publish_events();

        while self.session.status() != CallStatus::Closed {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.abandon(),
                },
                Some((id, timer)) = self.timer_events.recv() => {
                    self.session.handle_timer(id, timer);
                }
                Some(event) = self.transport_events.recv() => {
                    self.session.handle_transport_event(event);
                }
                Some(event) = self.media_events.recv() => {
                    self.session.handle_media_event(event);
                }
                Some(event) = self.monitor_events.recv() => {
                    self.session.handle_monitor_event(event);
                }
            }
            self.publish_events();
        }

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!(target: "Call/Runner", "Call runner stopped");
    }

    fn handle_command(&mut self, command: CallCommand) {
        trace!(target: "Call/Runner", "Command: {command:?}");
        match command {
            CallCommand::Accept(options) => self.session.accept(options),
            CallCommand::Disconnect => self.session.disconnect(),
            CallCommand::Reject => self.session.reject(),
            CallCommand::Ignore => self.session.ignore(),
            CallCommand::Mute(muted) => self.session.mute(muted),
            CallCommand::SendDigits {
                digits,
                response_tx,
            } => {
                let _ = response_tx.send(self.session.send_digits(&digits));
            }
            CallCommand::SendMessage {
                message,
                response_tx,
            } => {
                let _ = response_tx.send(self.session.send_message(message));
            }
            CallCommand::PostFeedback {
                score,
                issue,
                response_tx,
            } => {
                let _ = response_tx.send(self.session.post_feedback(score, issue));
            }
            CallCommand::Snapshot { response_tx } => {
                let _ = response_tx.send(self.snapshot());
            }
        }
    }

    /// Every handle is gone; nobody can end the call any more.
    fn abandon(&mut self) {
        debug!(target: "Call/Runner", "All call handles dropped, ending call");
        self.session.disconnect();
        if self.session.status() != CallStatus::Closed {
            self.session.ignore();
        }
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.session.status(),
            direction: self.session.direction(),
            call_sid: self.session.call_sid().map(str::to_string),
            temp_call_sid: self.session.temp_call_sid().to_string(),
            is_muted: self.session.is_muted(),
            codec: self.session.codec().map(str::to_string),
            connect_token: self.session.connect_token(),
        }
    }

    fn publish_events(&mut self) {
        let events = self.session.drain_events();
        if events.is_empty() {
            return;
        }
        let slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = slot.as_ref() else {
            return;
        };
        for event in events {
            if sender.send(event).is_err() {
                trace!(target: "Call/Runner", "No subscribers for call event");
            }
        }
    }
}

/// Cloneable handle to a running call.
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    events: EventSlot,
}

impl CallHandle {
    /// Subscribes to session events raised from now on. The stream ends
    /// once the call is closed.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        match self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub async fn accept(&self, options: AcceptOptions) -> Result<(), CallError> {
        self.send(CallCommand::Accept(options)).await
    }

    pub async fn disconnect(&self) -> Result<(), CallError> {
        self.send(CallCommand::Disconnect).await
    }

    pub async fn reject(&self) -> Result<(), CallError> {
        self.send(CallCommand::Reject).await
    }

    pub async fn ignore(&self) -> Result<(), CallError> {
        self.send(CallCommand::Ignore).await
    }

    pub async fn mute(&self, muted: bool) -> Result<(), CallError> {
        self.send(CallCommand::Mute(muted)).await
    }

    pub async fn send_digits(&self, digits: impl Into<String>) -> Result<(), CallError> {
        let digits = digits.into();
        self.request(|response_tx| CallCommand::SendDigits {
            digits,
            response_tx,
        })
        .await?
    }

    /// Returns the correlation id of the message.
    pub async fn send_message(&self, message: UserMessage) -> Result<String, CallError> {
        self.request(|response_tx| CallCommand::SendMessage {
            message,
            response_tx,
        })
        .await?
    }

    pub async fn post_feedback(
        &self,
        score: Option<u8>,
        issue: Option<FeedbackIssue>,
    ) -> Result<(), CallError> {
        self.request(|response_tx| CallCommand::PostFeedback {
            score,
            issue,
            response_tx,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        self.request(|response_tx| CallCommand::Snapshot { response_tx })
            .await
    }

    async fn send(&self, command: CallCommand) -> Result<(), CallError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CallError::SessionClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> CallCommand,
    ) -> Result<T, CallError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(command(response_tx)).await?;
        response_rx.await.map_err(|_| CallError::SessionClosed)
    }
}
