use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleTotals {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_lost: u64,
    pub packets_lost_fraction: f64,
    pub packets_received: u64,
    pub packets_sent: u64,
}

/// One monitor sample of the media connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub audio_input_level: f64,
    pub audio_output_level: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub codec_name: Option<String>,
    pub jitter: f64,
    pub mos: Option<f64>,
    pub packets_lost: u64,
    pub packets_lost_fraction: f64,
    pub packets_received: u64,
    pub rtt: f64,
    pub timestamp: DateTime<Utc>,
    pub totals: SampleTotals,
}

/// A sample with the call volumes current at the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMetrics {
    pub sample: Sample,
    pub input_volume: f64,
    pub output_volume: f64,
}

/// Flattened telemetry record for a [`CallMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub audio_codec: Option<String>,
    pub audio_level_in: f64,
    pub audio_level_out: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub call_volume_input: f64,
    pub call_volume_output: f64,
    pub jitter: f64,
    pub mos: Option<f64>,
    pub packets_lost: u64,
    pub packets_lost_fraction: f64,
    pub packets_received: u64,
    pub rtt: f64,
    pub timestamp: String,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub total_packets_lost: u64,
    pub total_packets_received: u64,
    pub total_packets_sent: u64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<&CallMetrics> for MetricRecord {
    fn from(metrics: &CallMetrics) -> Self {
        let sample = &metrics.sample;
        Self {
            audio_codec: sample.codec_name.clone(),
            audio_level_in: sample.audio_input_level,
            audio_level_out: sample.audio_output_level,
            bytes_received: sample.bytes_received,
            bytes_sent: sample.bytes_sent,
            call_volume_input: metrics.input_volume,
            call_volume_output: metrics.output_volume,
            jitter: sample.jitter,
            mos: sample.mos.map(round2),
            packets_lost: sample.packets_lost,
            packets_lost_fraction: round2(sample.packets_lost_fraction),
            packets_received: sample.packets_received,
            rtt: sample.rtt,
            timestamp: sample.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            total_bytes_received: sample.totals.bytes_received,
            total_bytes_sent: sample.totals.bytes_sent,
            total_packets_lost: sample.totals.packets_lost,
            total_packets_received: sample.totals.packets_received,
            total_packets_sent: sample.totals.packets_sent,
        }
    }
}
