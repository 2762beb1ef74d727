//! Quality monitoring as seen by the call session.
//!
//! The monitor itself is an external collaborator: it samples the media
//! connection, tracks thresholds and reports through [`MonitorEvent`]s. This
//! module owns the vocabulary and the mapping of monitor warnings to the
//! stable names applications see.

pub mod metrics;

use serde::Serialize;

pub use metrics::{CallMetrics, MetricRecord, Sample, SampleTotals};

/// A metric the monitor can raise a warning on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    AudioInputLevel,
    AudioOutputLevel,
    BytesReceived,
    BytesSent,
    Jitter,
    Mos,
    Rtt,
    PacketsLostFraction,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AudioInputLevel => "audioInputLevel",
            Self::AudioOutputLevel => "audioOutputLevel",
            Self::BytesReceived => "bytesReceived",
            Self::BytesSent => "bytesSent",
            Self::Jitter => "jitter",
            Self::Mos => "mos",
            Self::Rtt => "rtt",
            Self::PacketsLostFraction => "packetsLostFraction",
        }
    }

    /// Telemetry group prefix for warnings on this metric.
    pub fn group_prefix(self) -> &'static str {
        if self.as_str().starts_with("audio") {
            "audio-level-"
        } else {
            "network-quality-"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdKind {
    Max,
    MaxAverage,
    MaxDuration,
    Min,
    MinStandardDeviation,
}

impl ThresholdKind {
    pub fn warning_prefix(self) -> &'static str {
        match self {
            Self::Max | Self::MaxAverage => "high-",
            Self::MaxDuration | Self::MinStandardDeviation => "constant-",
            Self::Min => "low-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub kind: ThresholdKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WarningValue {
    Single(f64),
    Series(Vec<f64>),
}

/// A threshold crossing reported by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub metric: Metric,
    pub threshold: Threshold,
    pub value: WarningValue,
}

impl Warning {
    /// Stable, externally visible name such as `high-rtt` or `low-mos`.
    pub fn external_name(&self) -> String {
        let suffix = match (self.metric, self.threshold.kind) {
            (Metric::PacketsLostFraction, ThresholdKind::MaxAverage) => "packets-lost-fraction",
            (Metric::PacketsLostFraction, _) => "packet-loss",
            (Metric::AudioInputLevel, _) => "audio-input-level",
            (Metric::AudioOutputLevel, _) => "audio-output-level",
            (Metric::BytesReceived, _) => "bytes-received",
            (Metric::BytesSent, _) => "bytes-sent",
            (Metric::Jitter, _) => "jitter",
            (Metric::Mos, _) => "mos",
            (Metric::Rtt, _) => "rtt",
        };
        format!("{}{}", self.threshold.kind.warning_prefix(), suffix)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Sample(Sample),
    Warning(Warning),
    WarningCleared(Warning),
}

/// Capability interface of the quality monitor.
pub trait QualityMonitor: Send {
    /// Starts sampling the negotiated connection.
    fn enable(&mut self);

    fn disable(&mut self);

    fn enable_warnings(&mut self);

    fn disable_warnings(&mut self);

    fn has_active_warning(&self, metric: Metric, threshold: ThresholdKind) -> bool;

    /// Feeds raw audio levels, scaled to `0..=32767`.
    fn add_volumes(&mut self, input: f64, output: f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(metric: Metric, kind: ThresholdKind) -> Warning {
        Warning {
            metric,
            threshold: Threshold { kind, value: 1.0 },
            value: WarningValue::Single(2.0),
        }
    }

    #[test]
    fn test_packet_loss_maps_to_two_names() {
        assert_eq!(
            warning(Metric::PacketsLostFraction, ThresholdKind::Max).external_name(),
            "high-packet-loss"
        );
        assert_eq!(
            warning(Metric::PacketsLostFraction, ThresholdKind::MaxAverage).external_name(),
            "high-packets-lost-fraction"
        );
    }

    #[test]
    fn test_prefixes_follow_threshold_kind() {
        assert_eq!(warning(Metric::Rtt, ThresholdKind::Max).external_name(), "high-rtt");
        assert_eq!(warning(Metric::Mos, ThresholdKind::Min).external_name(), "low-mos");
        assert_eq!(
            warning(Metric::BytesSent, ThresholdKind::Min).external_name(),
            "low-bytes-sent"
        );
        assert_eq!(
            warning(Metric::AudioInputLevel, ThresholdKind::MaxDuration).external_name(),
            "constant-audio-input-level"
        );
        assert_eq!(
            warning(Metric::AudioOutputLevel, ThresholdKind::MinStandardDeviation)
                .external_name(),
            "constant-audio-output-level"
        );
    }

    #[test]
    fn test_group_prefix() {
        assert_eq!(Metric::AudioOutputLevel.group_prefix(), "audio-level-");
        assert_eq!(Metric::Jitter.group_prefix(), "network-quality-");
    }
}
