//! Test doubles for the call session and its collaborators.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::calls::dtmf::{DtmfTone, TonePlayer};
use crate::calls::media::{AcceptOptions, DtmfSender, MediaEngine, MediaError};
use crate::calls::message::IdGenerator;
use crate::calls::timer::{Timer, TimerId, Timers};
use crate::quality::{Metric, QualityMonitor, ThresholdKind};
use crate::telemetry::{MetricsBatch, Publisher, TelemetryEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

struct ManualClock {
    origin: Instant,
    elapsed: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), Timer>,
}

/// Timers on a clock that only moves when told to. Clones share the clock.
#[derive(Clone)]
pub struct ManualTimers {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Mutex::new(ManualClock {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                next_id: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.clock).elapsed
    }

    /// Moves the clock forward and returns the timers that came due, in
    /// firing order.
    pub fn advance(&self, by: Duration) -> Vec<(TimerId, Timer)> {
        let target = self.elapsed() + by;
        let mut fired = Vec::new();
        while let Some(entry) = self.pop_due(target) {
            fired.push(entry);
        }
        lock(&self.clock).elapsed = target;
        fired
    }

    /// Pops the earliest timer due no later than `deadline` (measured from
    /// the start of the clock) and moves the clock to its due time.
    pub fn pop_due(&self, deadline: Duration) -> Option<(TimerId, Timer)> {
        let mut clock = lock(&self.clock);
        let (&(due, id), _) = clock.pending.first_key_value()?;
        if due > deadline {
            return None;
        }
        let timer = clock.pending.remove(&(due, id))?;
        clock.elapsed = clock.elapsed.max(due);
        Some((TimerId(id), timer))
    }

    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut clock = lock(&self.clock);
        clock.elapsed = clock.elapsed.max(elapsed);
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.clock).pending.len()
    }

    pub fn pending(&self) -> Vec<Timer> {
        lock(&self.clock).pending.values().copied().collect()
    }
}

impl Timers for ManualTimers {
    fn now(&self) -> Instant {
        let clock = lock(&self.clock);
        clock.origin + clock.elapsed
    }

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        let mut clock = lock(&self.clock);
        clock.next_id += 1;
        let id = clock.next_id;
        let due = clock.elapsed + delay;
        clock.pending.insert((due, id), timer);
        TimerId(id)
    }

    fn cancel(&mut self, id: TimerId) {
        lock(&self.clock).pending.retain(|&(_, pending), _| pending != id.0);
    }
}

/// Predictable ids: `KX0000...1`, `KX0000...2` and a fixed temp call id.
#[derive(Default)]
pub struct SequentialIds {
    next: u64,
}

pub const TEMP_CALL_SID: &str = "TJSa1b2c3d4-0000-4000-8000-000000000001";

impl IdGenerator for SequentialIds {
    fn voice_event_sid(&mut self) -> String {
        self.next += 1;
        format!("KX{:032x}", self.next)
    }

    fn temp_call_sid(&mut self) -> String {
        TEMP_CALL_SID.to_string()
    }
}

/// What the scripted media engine was asked to do, and how it should answer.
pub struct MediaState {
    pub calls: Vec<String>,
    pub muted: bool,
    pub local_description: Option<String>,
    pub ice_disconnected: bool,
    pub observes_ice_restart: bool,
    pub has_dtmf_sender: bool,
    pub can_insert_dtmf: bool,
    pub inserted: Vec<(String, Duration, Duration)>,
    pub call_sid: Option<String>,
    /// Returned by the next `answer_incoming_call`/`make_outgoing_call`.
    pub fail_next_call: Option<MediaError>,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            muted: false,
            local_description: Some("v=0 local".to_string()),
            ice_disconnected: false,
            observes_ice_restart: true,
            has_dtmf_sender: false,
            can_insert_dtmf: true,
            inserted: Vec::new(),
            call_sid: None,
            fail_next_call: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct MediaProbe(Arc<Mutex<MediaState>>);

impl MediaProbe {
    pub fn with<R>(&self, f: impl FnOnce(&mut MediaState) -> R) -> R {
        f(&mut lock(&self.0))
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.0).calls.clone()
    }

    pub fn called(&self, name: &str) -> bool {
        lock(&self.0).calls.iter().any(|c| c.split(':').next() == Some(name))
    }

    pub fn inserted(&self) -> Vec<String> {
        lock(&self.0).inserted.iter().map(|(tones, _, _)| tones.clone()).collect()
    }
}

struct MockDtmfSender(MediaProbe);

impl DtmfSender for MockDtmfSender {
    fn can_insert_dtmf(&self) -> bool {
        self.0.with(|s| s.can_insert_dtmf)
    }

    fn insert_dtmf(&mut self, tones: &str, duration: Duration, gap: Duration) {
        self.0.with(|s| s.inserted.push((tones.to_string(), duration, gap)));
    }
}

/// Media engine that records every request and answers from [`MediaState`].
pub struct MockMedia {
    probe: MediaProbe,
    sender: MockDtmfSender,
}

impl MockMedia {
    pub fn new() -> (Self, MediaProbe) {
        let probe = MediaProbe::default();
        let media = Self {
            probe: probe.clone(),
            sender: MockDtmfSender(probe.clone()),
        };
        (media, probe)
    }

    fn record(&self, call: String) {
        self.probe.with(|s| s.calls.push(call));
    }

    fn take_failure(&self) -> Result<(), MediaError> {
        match self.probe.with(|s| s.fail_next_call.take()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl MediaEngine for MockMedia {
    fn open_input(&mut self, _options: &AcceptOptions) {
        self.record("open_input".into());
    }

    fn answer_incoming_call(&mut self, call_sid: &str, offer_sdp: Option<&str>) -> Result<(), MediaError> {
        self.record(format!("answer_incoming_call:{call_sid}:{}", offer_sdp.unwrap_or("")));
        self.take_failure()
    }

    fn make_outgoing_call(
        &mut self,
        params: &str,
        reconnect_token: Option<&str>,
        call_sid: &str,
    ) -> Result<(), MediaError> {
        self.record(format!(
            "make_outgoing_call:{params}:{}:{call_sid}",
            reconnect_token.unwrap_or("")
        ));
        self.take_failure()
    }

    fn process_answer(&mut self, sdp: &str) -> Result<(), MediaError> {
        self.record(format!("process_answer:{sdp}"));
        Ok(())
    }

    fn ice_restart(&mut self) {
        self.record("ice_restart".into());
    }

    fn close(&mut self) {
        self.record("close".into());
    }

    fn ignore(&mut self, call_sid: Option<&str>) {
        self.record(format!("ignore:{}", call_sid.unwrap_or("")));
    }

    fn reject(&mut self, call_sid: Option<&str>) {
        self.record(format!("reject:{}", call_sid.unwrap_or("")));
    }

    fn set_muted(&mut self, muted: bool) {
        self.probe.with(|s| s.muted = muted);
    }

    fn is_muted(&self) -> bool {
        self.probe.with(|s| s.muted)
    }

    fn local_description(&self) -> Option<String> {
        self.probe.with(|s| s.local_description.clone())
    }

    fn is_ice_disconnected(&self) -> bool {
        self.probe.with(|s| s.ice_disconnected)
    }

    fn observes_ice_restart(&self) -> bool {
        self.probe.with(|s| s.observes_ice_restart)
    }

    fn dtmf_sender(&mut self) -> Option<&mut dyn DtmfSender> {
        if self.probe.with(|s| s.has_dtmf_sender) {
            Some(&mut self.sender)
        } else {
            None
        }
    }

    fn set_call_sid(&mut self, call_sid: &str) {
        self.probe.with(|s| s.call_sid = Some(call_sid.to_string()));
    }
}

#[derive(Default)]
pub struct MonitorState {
    pub enabled: bool,
    pub warnings_enabled: bool,
    pub active: HashSet<(Metric, ThresholdKind)>,
    pub volumes: Vec<(f64, f64)>,
}

#[derive(Clone, Default)]
pub struct MonitorProbe(Arc<Mutex<MonitorState>>);

impl MonitorProbe {
    pub fn with<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        f(&mut lock(&self.0))
    }
}

pub struct FakeMonitor(MonitorProbe);

impl FakeMonitor {
    pub fn new() -> (Self, MonitorProbe) {
        let probe = MonitorProbe::default();
        (Self(probe.clone()), probe)
    }
}

impl QualityMonitor for FakeMonitor {
    fn enable(&mut self) {
        self.0.with(|s| s.enabled = true);
    }

    fn disable(&mut self) {
        self.0.with(|s| s.enabled = false);
    }

    fn enable_warnings(&mut self) {
        self.0.with(|s| s.warnings_enabled = true);
    }

    fn disable_warnings(&mut self) {
        self.0.with(|s| s.warnings_enabled = false);
    }

    fn has_active_warning(&self, metric: Metric, threshold: ThresholdKind) -> bool {
        self.0.with(|s| s.active.contains(&(metric, threshold)))
    }

    fn add_volumes(&mut self, input: f64, output: f64) {
        self.0.with(|s| s.volumes.push((input, output)));
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<TelemetryEvent>>,
    pub batches: Mutex<Vec<MetricsBatch>>,
}

impl RecordingPublisher {
    /// `group/name` of every posted event.
    pub fn names(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|e| format!("{}/{}", e.group, e.name))
            .collect()
    }

    pub fn find(&self, group: &str, name: &str) -> Option<TelemetryEvent> {
        lock(&self.events)
            .iter()
            .find(|e| e.group == group && e.name == name)
            .cloned()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batches).iter().map(|b| b.records.len()).collect()
    }
}

impl Publisher for RecordingPublisher {
    fn post(&self, event: TelemetryEvent) {
        lock(&self.events).push(event);
    }

    fn post_metrics(&self, batch: MetricsBatch) {
        lock(&self.batches).push(batch);
    }
}

#[derive(Clone, Default)]
pub struct RecordingTonePlayer(pub Arc<Mutex<Vec<DtmfTone>>>);

impl RecordingTonePlayer {
    pub fn played(&self) -> Vec<&'static str> {
        lock(&self.0).iter().map(|t| t.sound_name()).collect()
    }
}

impl TonePlayer for RecordingTonePlayer {
    fn play(&mut self, tone: DtmfTone) {
        lock(&self.0).push(tone);
    }
}
