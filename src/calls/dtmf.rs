use std::collections::VecDeque;
use std::time::Duration;

use super::timer::TimerId;
use crate::error::CallError;

pub const TONE_DURATION: Duration = Duration::from_millis(160);
pub const INTER_TONE_GAP: Duration = Duration::from_millis(70);
/// Length of an explicit `w` pause on the native sender.
pub const PAUSE_DURATION: Duration = Duration::from_millis(500);
pub const SIDETONE_INTERVAL: Duration = Duration::from_millis(200);

pub const PAUSE: char = 'w';

pub fn validate_digits(digits: &str) -> Result<(), CallError> {
    if digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '*' | '#' | PAUSE))
    {
        Ok(())
    } else {
        Err(CallError::InvalidArgument(
            "Illegal character passed into sendDigits".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtmfTone {
    Digit(u8),
    Star,
    Pound,
}

const DIGIT_SOUNDS: [&str; 10] = [
    "dtmf0", "dtmf1", "dtmf2", "dtmf3", "dtmf4", "dtmf5", "dtmf6", "dtmf7", "dtmf8", "dtmf9",
];

impl DtmfTone {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Self::Star),
            '#' => Some(Self::Pound),
            _ => c.to_digit(10).map(|d| Self::Digit(d as u8)),
        }
    }

    pub fn sound_name(self) -> &'static str {
        match self {
            Self::Digit(d) => DIGIT_SOUNDS[usize::from(d) % DIGIT_SOUNDS.len()],
            Self::Star => "dtmfs",
            Self::Pound => "dtmfh",
        }
    }

    /// `[high, low]` frequency pair in Hz.
    pub fn frequencies(self) -> [u32; 2] {
        let (high, low) = match self {
            Self::Digit(1) => (1230, 720),
            Self::Digit(2) => (1360, 720),
            Self::Digit(3) => (1480, 720),
            Self::Digit(4) => (1230, 790),
            Self::Digit(5) => (1360, 790),
            Self::Digit(6) => (1480, 790),
            Self::Digit(7) => (1230, 870),
            Self::Digit(8) => (1360, 870),
            Self::Digit(9) => (1480, 870),
            Self::Star => (1230, 960),
            Self::Pound => (1480, 960),
            Self::Digit(_) => (1360, 960),
        };
        [high, low]
    }
}

/// Plays local feedback tones.
pub trait TonePlayer: Send {
    fn play(&mut self, tone: DtmfTone);
}

/// Queues behind the two DTMF timer chains of a session.
#[derive(Debug, Default)]
pub(crate) struct DtmfQueues {
    /// `None` is a pause slot.
    pub sidetones: VecDeque<Option<DtmfTone>>,
    pub sidetone_timer: Option<TimerId>,
    pub chunks: VecDeque<String>,
    pub chunk_timer: Option<TimerId>,
}

impl DtmfQueues {
    pub fn push_sidetones(&mut self, digits: &str) {
        self.sidetones
            .extend(digits.chars().map(DtmfTone::from_char));
    }

    pub fn push_chunks(&mut self, digits: &str) {
        self.chunks
            .extend(digits.split(PAUSE).map(str::to_string));
    }

    /// Forgets everything queued and returns the timers to cancel.
    pub fn clear(&mut self) -> Vec<TimerId> {
        self.sidetones.clear();
        self.chunks.clear();
        self.sidetone_timer
            .take()
            .into_iter()
            .chain(self.chunk_timer.take())
            .collect()
    }
}
