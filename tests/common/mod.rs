//! Doubles for driving a call end to end through the public API.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use voice_call_client::calls::{
    AcceptOptions, CallEvent, CallHandle, CallRunner, CallSetup, DtmfSender, IdGenerator,
    MediaEngine, MediaError, MediaEvent,
};
use voice_call_client::config::{CallOptions, ChannelOptions};
use voice_call_client::quality::{Metric, MonitorEvent, QualityMonitor, ThresholdKind};
use voice_call_client::signaling::SignalChannel;
use voice_call_client::telemetry::{MetricsBatch, Publisher, TelemetryEvent};
use voice_call_client::transport::{Transport, TransportEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct TransportState {
    open: bool,
    closed: bool,
    sent: Vec<Value>,
}

/// Transport whose socket state is flipped by the test.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Arc<Mutex<TransportState>>);

impl ScriptedTransport {
    pub fn set_open(&self, open: bool) {
        lock(&self.0).open = open;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.0).closed
    }

    pub fn sent(&self) -> Vec<Value> {
        lock(&self.0).sent.clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|e| e["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn last(&self, kind: &str) -> Option<Value> {
        self.sent().into_iter().rev().find(|e| e["type"] == kind)
    }
}

impl Transport for ScriptedTransport {
    fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
        let mut state = lock(&self.0);
        if !state.open {
            anyhow::bail!("socket is not open");
        }
        state.sent.push(serde_json::from_str(text)?);
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.0).open
    }

    fn close(&self) {
        let mut state = lock(&self.0);
        state.open = false;
        state.closed = true;
    }

    fn uri(&self) -> Option<String> {
        Some("wss://scripted.invalid/signal".into())
    }

    fn update_uris(&self, _uris: Vec<String>) {}

    fn update_preferred_uri(&self, _uri: Option<String>) {}
}

/// Media engine that records requests by name.
#[derive(Clone, Default)]
pub struct ScriptedMedia {
    calls: Arc<Mutex<Vec<String>>>,
    muted: Arc<Mutex<bool>>,
}

impl ScriptedMedia {
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(name))
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }
}

impl MediaEngine for ScriptedMedia {
    fn open_input(&mut self, _options: &AcceptOptions) {
        self.record("open_input");
    }

    fn answer_incoming_call(&mut self, call_sid: &str, _offer_sdp: Option<&str>) -> Result<(), MediaError> {
        self.record(format!("answer_incoming_call {call_sid}"));
        Ok(())
    }

    fn make_outgoing_call(
        &mut self,
        _params: &str,
        _reconnect_token: Option<&str>,
        call_sid: &str,
    ) -> Result<(), MediaError> {
        self.record(format!("make_outgoing_call {call_sid}"));
        Ok(())
    }

    fn process_answer(&mut self, sdp: &str) -> Result<(), MediaError> {
        self.record(format!("process_answer {sdp}"));
        Ok(())
    }

    fn ice_restart(&mut self) {
        self.record("ice_restart");
    }

    fn close(&mut self) {
        self.record("close");
    }

    fn ignore(&mut self, _call_sid: Option<&str>) {
        self.record("ignore");
    }

    fn reject(&mut self, _call_sid: Option<&str>) {
        self.record("reject");
    }

    fn set_muted(&mut self, muted: bool) {
        *lock(&self.muted) = muted;
    }

    fn is_muted(&self) -> bool {
        *lock(&self.muted)
    }

    fn local_description(&self) -> Option<String> {
        Some("v=0 scripted".into())
    }

    fn is_ice_disconnected(&self) -> bool {
        false
    }

    fn dtmf_sender(&mut self) -> Option<&mut dyn DtmfSender> {
        None
    }

    fn set_call_sid(&mut self, _call_sid: &str) {}
}

pub struct QuietMonitor;

impl QualityMonitor for QuietMonitor {
    fn enable(&mut self) {}

    fn disable(&mut self) {}

    fn enable_warnings(&mut self) {}

    fn disable_warnings(&mut self) {}

    fn has_active_warning(&self, _metric: Metric, _threshold: ThresholdKind) -> bool {
        false
    }

    fn add_volumes(&mut self, _input: f64, _output: f64) {}
}

#[derive(Default)]
pub struct CollectingPublisher {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingPublisher {
    pub fn names(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|e| format!("{}/{}", e.group, e.name))
            .collect()
    }
}

impl Publisher for CollectingPublisher {
    fn post(&self, event: TelemetryEvent) {
        lock(&self.events).push(event);
    }

    fn post_metrics(&self, _batch: MetricsBatch) {}
}

pub struct FixedIds;

impl IdGenerator for FixedIds {
    fn voice_event_sid(&mut self) -> String {
        "KX00000000000000000000000000000001".into()
    }

    fn temp_call_sid(&mut self) -> String {
        "TJS00000000-0000-4000-8000-000000000000".into()
    }
}

/// A running call plus the levers to drive it.
pub struct Call {
    pub handle: CallHandle,
    pub events: broadcast::Receiver<CallEvent>,
    pub transport: ScriptedTransport,
    pub transport_tx: mpsc::Sender<TransportEvent>,
    pub media: ScriptedMedia,
    pub media_tx: mpsc::UnboundedSender<MediaEvent>,
    pub monitor_tx: mpsc::UnboundedSender<MonitorEvent>,
    pub publisher: Arc<CollectingPublisher>,
    pub task: tokio::task::JoinHandle<()>,
}

impl Call {
    pub fn start(options: CallOptions) -> Self {
        init_logging();

        let transport = ScriptedTransport::default();
        transport.set_open(true);
        let channel = SignalChannel::new(
            "tok-1",
            Arc::new(transport.clone()),
            ChannelOptions::default(),
        );
        let (transport_tx, transport_events) = mpsc::channel(32);
        let (media_tx, media_events) = mpsc::unbounded_channel();
        let (monitor_tx, monitor_events) = mpsc::unbounded_channel();
        let media = ScriptedMedia::default();
        let publisher = Arc::new(CollectingPublisher::default());

        let (runner, handle) = CallRunner::new(CallSetup {
            channel,
            transport_events,
            media: Box::new(media.clone()),
            media_events,
            monitor: Box::new(QuietMonitor),
            monitor_events,
            publisher: publisher.clone(),
            ids: Box::new(FixedIds),
            tone_player: None,
            options,
        });
        let events = handle.subscribe();
        let task = tokio::spawn(runner.run());

        Self {
            handle,
            events,
            transport,
            transport_tx,
            media,
            media_tx,
            monitor_tx,
            publisher,
            task,
        }
    }

    pub async fn frame(&self, kind: &str, payload: Value) {
        let text = serde_json::json!({ "type": kind, "payload": payload }).to_string();
        self.transport_tx
            .send(TransportEvent::TextReceived(text))
            .await
            .unwrap();
    }

    pub async fn next_event(&mut self) -> CallEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for a call event")
            .expect("call event stream closed")
    }
}

/// Yields to the runner until `condition` holds.
pub async fn until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
