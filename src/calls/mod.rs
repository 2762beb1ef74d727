//! Voice call control.
//!
//! # Architecture
//!
//! - [`CallSession`]: synchronous per-call state machine. It reacts to
//!   signaling, media and quality-monitor events and queues [`CallEvent`]s.
//! - [`CallRunner`] and [`CallHandle`]: tokio actor that owns a session and
//!   the handle applications use to drive it.
//! - [`ReconnectPolicy`]: backoff and ceiling for media reconnection.
//! - [`MediaEngine`], [`QualityMonitor`](crate::quality::QualityMonitor),
//!   [`TonePlayer`] and [`Timers`]: the collaborators a session is wired to.
//!
//! A call's [`CallStatus`] is derived from its lifecycle phase and the
//! media/signaling sub-statuses; see [`state`].

pub mod dtmf;
pub mod events;
pub mod media;
pub mod message;
pub mod reconnect;
pub mod runner;
pub mod session;
pub mod state;
pub mod timer;

pub use dtmf::{DtmfTone, TonePlayer};
pub use events::CallEvent;
pub use media::{AcceptOptions, DtmfSender, InputError, MediaEngine, MediaError, MediaEvent, StateGroup};
pub use message::{IdGenerator, RandomIds, UserMessage};
pub use reconnect::{BackoffConfig, ReconnectPolicy};
pub use runner::{CallHandle, CallRunner, CallSetup, CallSnapshot};
pub use session::{CallSession, CallerInfo, FeedbackIssue, SessionDeps};
pub use state::{CallDirection, CallStatus, MediaStatus, SignalingStatus};
pub use timer::{Timer, TimerId, Timers, TokioTimers};
