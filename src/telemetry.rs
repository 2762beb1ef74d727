//! Structured telemetry for calls.
//!
//! Sessions describe what happened as [`TelemetryEvent`]s and metric
//! [`MetricsBatch`]es; a [`Publisher`] decides where they go.

use chrono::{SecondsFormat, Utc};
use log::{debug, info, log, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use crate::calls::CallDirection;
use crate::config::{PublisherConfig, RELEASE_VERSION};
use crate::quality::MetricRecord;

const EVENTS_PATH: &str = "/v4/EndpointEvents";
const METRICS_PATH: &str = "/v4/EndpointMetrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    fn as_log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// Identity of the call an event belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub call_sid: Option<String>,
    pub temp_call_sid: String,
    pub direction: CallDirection,
    pub gateway: Option<String>,
}

impl CallContext {
    fn has_identity(&self) -> bool {
        self.call_sid.as_deref().is_some_and(|s| !s.is_empty()) || !self.temp_call_sid.is_empty()
    }

    fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("call_sid".into(), json!(self.call_sid));
        fields.insert("temp_call_sid".into(), json!(self.temp_call_sid));
        fields.insert("direction".into(), json!(self.direction.as_str()));
        fields.insert("sdk_version".into(), json!(RELEASE_VERSION));
        if let Some(gateway) = &self.gateway {
            fields.insert("gateway".into(), json!(gateway));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub level: Level,
    pub group: String,
    pub name: String,
    pub payload: Option<Value>,
    /// Published even when telemetry is disabled.
    pub force: bool,
    pub context: CallContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsBatch {
    pub group: String,
    pub name: String,
    pub records: Vec<MetricRecord>,
    pub custom_fields: Value,
    pub context: CallContext,
}

pub trait Publisher: Send + Sync {
    fn post(&self, event: TelemetryEvent);

    fn post_metrics(&self, batch: MetricsBatch);
}

/// Builds the JSON body of an event post.
pub fn event_body(config: &PublisherConfig, event: &TelemetryEvent) -> Value {
    let mut payload = event.context.fields();
    match &event.payload {
        Some(Value::Object(extra)) => payload.extend(extra.clone()),
        Some(other) => {
            payload.insert("data".into(), other.clone());
        }
        None => {}
    }

    json!({
        "group": event.group,
        "level": event.level,
        "name": event.name,
        "payload": payload,
        "payload_type": "application/json",
        "private": false,
        "publisher": config.product_name,
        "publisher_metadata": config.metadata,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Builds the JSON body of a metrics post.
pub fn metrics_body(config: &PublisherConfig, batch: &MetricsBatch) -> Value {
    let records: Vec<Value> = batch
        .records
        .iter()
        .map(|record| {
            let mut value = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
            if let (Value::Object(fields), Value::Object(custom)) =
                (&mut value, &batch.custom_fields)
            {
                fields.extend(custom.clone());
            }
            value
        })
        .collect();

    json!({
        "group": batch.group,
        "level": Level::Info,
        "name": batch.name,
        "payload": records,
        "payload_type": "application/json",
        "private": false,
        "publisher": config.product_name,
        "publisher_metadata": config.metadata,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

struct PostRequest {
    path: &'static str,
    body: Value,
}

/// Posts telemetry to an insights endpoint over HTTPS.
///
/// Requests are handed to a background task so posting never blocks the
/// session; `ureq` runs inside `spawn_blocking`. Must be created inside a
/// tokio runtime.
pub struct InsightsPublisher {
    config: PublisherConfig,
    requests: mpsc::UnboundedSender<PostRequest>,
}

impl InsightsPublisher {
    pub fn new(config: PublisherConfig) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        if let Some(host) = config.host.clone() {
            tokio::spawn(post_worker(host, config.token.clone(), rx));
        } else {
            info!(target: "Telemetry", "No insights host configured, telemetry is disabled");
        }
        Self { config, requests }
    }

    fn should_publish(&self, force: bool, context: &CallContext) -> bool {
        (self.config.enabled || force) && self.config.host.is_some() && context.has_identity()
    }

    fn enqueue(&self, path: &'static str, body: Value) {
        if self.requests.send(PostRequest { path, body }).is_err() {
            debug!(target: "Telemetry", "Telemetry worker is gone, dropping post");
        }
    }
}

impl Publisher for InsightsPublisher {
    fn post(&self, event: TelemetryEvent) {
        log!(
            target: "Telemetry",
            event.level.as_log_level(),
            "{}/{} {}",
            event.group,
            event.name,
            event.payload.as_ref().map(Value::to_string).unwrap_or_default()
        );
        if self.should_publish(event.force, &event.context) {
            self.enqueue(EVENTS_PATH, event_body(&self.config, &event));
        }
    }

    fn post_metrics(&self, batch: MetricsBatch) {
        if batch.records.is_empty() || !self.should_publish(false, &batch.context) {
            return;
        }
        self.enqueue(METRICS_PATH, metrics_body(&self.config, &batch));
    }
}

async fn post_worker(host: String, token: String, mut rx: mpsc::UnboundedReceiver<PostRequest>) {
    while let Some(request) = rx.recv().await {
        let url = format!("https://{host}{}", request.path);
        let token = token.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<u16, anyhow::Error> {
            let body = serde_json::to_vec(&request.body)?;
            let response = ureq::post(&url)
                .header("Content-Type", "application/json")
                .header("X-Twilio-Token", &token)
                .send(&body[..])?;
            Ok(response.status().as_u16())
        })
        .await;

        match result {
            Ok(Ok(status)) => debug!(target: "Telemetry", "Posted to {} ({status})", request.path),
            Ok(Err(e)) => warn!(target: "Telemetry", "Failed to post to {}: {e}", request.path),
            Err(e) => warn!(target: "Telemetry", "Telemetry post task failed: {e}"),
        }
    }
    debug!(target: "Telemetry", "Telemetry worker stopped");
}

/// Publisher that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn post(&self, event: TelemetryEvent) {
        log!(
            target: "Telemetry",
            event.level.as_log_level(),
            "{}/{} {}",
            event.group,
            event.name,
            event.payload.as_ref().map(Value::to_string).unwrap_or_default()
        );
    }

    fn post_metrics(&self, batch: MetricsBatch) {
        debug!(
            target: "Telemetry",
            "{}/{}: {} records",
            batch.group,
            batch.name,
            batch.records.len()
        );
    }
}
