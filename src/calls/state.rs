//! Call status model.
//!
//! The overall [`CallStatus`] is never stored. It is derived from the
//! lifecycle [`Phase`] and the (media, signaling) pair, so the three views
//! can't drift apart.

use serde::Serialize;

/// Externally visible status of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Connecting,
    Ringing,
    Open,
    Reconnecting,
    Closed,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connecting => "connecting",
            Self::Ringing => "ringing",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Statuses from which a local or remote disconnect has something to tear down.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Ringing | Self::Open | Self::Reconnecting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MediaStatus {
    #[default]
    Pending,
    Open,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SignalingStatus {
    #[default]
    Pending,
    Open,
    Reconnecting,
    Closed,
}

/// Where the call is in its lifecycle, independent of connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Pending,
    Connecting,
    Ringing,
    /// Answered and media opened at least once.
    Established,
    Closed,
}

pub fn derive_status(phase: Phase, media: MediaStatus, signaling: SignalingStatus) -> CallStatus {
    match phase {
        Phase::Pending => CallStatus::Pending,
        Phase::Closed => CallStatus::Closed,
        _ if media == MediaStatus::Reconnecting || signaling == SignalingStatus::Reconnecting => {
            CallStatus::Reconnecting
        }
        Phase::Connecting => CallStatus::Connecting,
        Phase::Ringing => CallStatus::Ringing,
        Phase::Established => CallStatus::Open,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl CallDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_and_closed_ignore_substatus() {
        assert_eq!(
            derive_status(
                Phase::Pending,
                MediaStatus::Reconnecting,
                SignalingStatus::Reconnecting
            ),
            CallStatus::Pending
        );
        assert_eq!(
            derive_status(
                Phase::Closed,
                MediaStatus::Reconnecting,
                SignalingStatus::Open
            ),
            CallStatus::Closed
        );
    }

    #[test]
    fn test_either_substatus_reconnecting_wins() {
        assert_eq!(
            derive_status(
                Phase::Established,
                MediaStatus::Open,
                SignalingStatus::Reconnecting
            ),
            CallStatus::Reconnecting
        );
        assert_eq!(
            derive_status(
                Phase::Established,
                MediaStatus::Reconnecting,
                SignalingStatus::Open
            ),
            CallStatus::Reconnecting
        );
        assert_eq!(
            derive_status(
                Phase::Connecting,
                MediaStatus::Reconnecting,
                SignalingStatus::Pending
            ),
            CallStatus::Reconnecting
        );
    }

    #[test]
    fn test_established_is_open_only_when_both_recovered() {
        assert_eq!(
            derive_status(Phase::Established, MediaStatus::Open, SignalingStatus::Open),
            CallStatus::Open
        );
        assert_eq!(
            derive_status(Phase::Ringing, MediaStatus::Pending, SignalingStatus::Pending),
            CallStatus::Ringing
        );
    }

    #[test]
    fn test_live_statuses() {
        assert!(!CallStatus::Pending.is_live());
        assert!(CallStatus::Reconnecting.is_live());
        assert!(!CallStatus::Closed.is_live());
    }
}
