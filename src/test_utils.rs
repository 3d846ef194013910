//! Test doubles shared by unit tests.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    hashing::{KeyHasher, Md5KeyHasher},
    transport::{Endpoint, Transport},
    Error, Event, Result, SdkMetadata,
};

pub(crate) fn test_metadata() -> SdkMetadata {
    SdkMetadata::new(
        "stable-1".to_owned(),
        "session-1".to_owned(),
        Some("com.example.app".to_owned()),
        Some("1.0.0".to_owned()),
    )
}

/// Build an `initialize` response body keyed by md5-hashed names.
pub(crate) fn snapshot_json(
    gates: &[(&str, bool)],
    configs: &[(&str, serde_json::Value, &str)],
) -> serde_json::Value {
    let feature_gates: serde_json::Map<_, _> = gates
        .iter()
        .map(|(name, value)| {
            (
                Md5KeyHasher.hash(name),
                serde_json::json!({"name": name, "value": value, "rule_id": "rule"}),
            )
        })
        .collect();
    let dynamic_configs: serde_json::Map<_, _> = configs
        .iter()
        .map(|(name, value, group)| {
            (
                Md5KeyHasher.hash(name),
                serde_json::json!({"name": name, "value": value, "rule_id": "rule", "group": group}),
            )
        })
        .collect();
    serde_json::json!({
        "feature_gates": feature_gates,
        "dynamic_configs": dynamic_configs,
        "has_updates": true,
        "time": 1,
    })
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedBatch {
    pub events: Vec<Event>,
    pub metadata: SdkMetadata,
}

#[derive(Default)]
struct Recorded {
    initialize_requests: Vec<serde_json::Value>,
    batches: Vec<RecordedBatch>,
    log_event_attempts: usize,
}

#[derive(Default)]
struct Inner {
    initialize_responses: Mutex<VecDeque<Result<serde_json::Value>>>,
    recorded: Mutex<Recorded>,
    changed: Condvar,
    fail_log_events: AtomicBool,
    /// While `true`, initialize requests block.
    initialize_paused: Mutex<bool>,
    initialize_resumed: Condvar,
    /// While `true`, log_event requests block once counted as an attempt.
    log_events_paused: Mutex<bool>,
    log_events_resumed: Condvar,
}

/// In-memory [`Transport`] with scripted `initialize` responses and recorded `log_event` batches.
///
/// Initialize requests without a scripted response fail with a 503.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    inner: Arc<Inner>,
}

impl RecordingTransport {
    pub fn new() -> RecordingTransport {
        RecordingTransport::default()
    }

    pub fn push_initialize_response(&self, response: Result<serde_json::Value>) {
        self.inner
            .initialize_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    pub fn fail_log_events(&self, fail: bool) {
        self.inner.fail_log_events.store(fail, Ordering::SeqCst);
    }

    pub fn pause_initialize(&self) {
        *self.inner.initialize_paused.lock().unwrap() = true;
    }

    pub fn resume_initialize(&self) {
        *self.inner.initialize_paused.lock().unwrap() = false;
        self.inner.initialize_resumed.notify_all();
    }

    /// Make deliveries hang, as on a slow network, until `resume_log_events()`.
    pub fn pause_log_events(&self) {
        *self.inner.log_events_paused.lock().unwrap() = true;
    }

    pub fn resume_log_events(&self) {
        *self.inner.log_events_paused.lock().unwrap() = false;
        self.inner.log_events_resumed.notify_all();
    }

    pub fn initialize_requests(&self) -> Vec<serde_json::Value> {
        self.inner.recorded.lock().unwrap().initialize_requests.clone()
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.inner.recorded.lock().unwrap().batches.clone()
    }

    /// Block until at least `count` batches were delivered successfully.
    pub fn wait_for_batches(&self, count: usize, timeout: Duration) -> Vec<RecordedBatch> {
        self.wait_until(timeout, |r| r.batches.len() >= count);
        self.batches()
    }

    /// Block until at least `count` log_event requests were made, successful or not.
    pub fn wait_for_attempts(&self, count: usize, timeout: Duration) {
        self.wait_until(timeout, |r| r.log_event_attempts >= count);
    }

    /// Block until at least `count` initialize requests were received.
    pub fn wait_for_initialize_requests(&self, count: usize, timeout: Duration) {
        self.wait_until(timeout, |r| r.initialize_requests.len() >= count);
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Recorded) -> bool) {
        let deadline = Instant::now() + timeout;
        let mut recorded = self.inner.recorded.lock().unwrap();
        while !done(&recorded) {
            let now = Instant::now();
            assert!(now < deadline, "timed out waiting for transport");
            recorded = self
                .inner
                .changed
                .wait_timeout(recorded, deadline - now)
                .unwrap()
                .0;
        }
    }
}

fn wait_while_paused(paused: &Mutex<bool>, resumed: &Condvar) {
    let mut paused = paused.lock().unwrap();
    while *paused {
        paused = resumed.wait(paused).unwrap();
    }
}

impl Transport for RecordingTransport {
    fn post(&self, endpoint: Endpoint, body: &serde_json::Value) -> Result<serde_json::Value> {
        match endpoint {
            Endpoint::Initialize => {
                {
                    let mut recorded = self.inner.recorded.lock().unwrap();
                    recorded.initialize_requests.push(body.clone());
                    self.inner.changed.notify_all();
                }
                wait_while_paused(&self.inner.initialize_paused, &self.inner.initialize_resumed);

                self.inner
                    .initialize_responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(Error::UnexpectedStatus(503)))
            }
            Endpoint::LogEvent => {
                {
                    let mut recorded = self.inner.recorded.lock().unwrap();
                    recorded.log_event_attempts += 1;
                    self.inner.changed.notify_all();
                }
                wait_while_paused(&self.inner.log_events_paused, &self.inner.log_events_resumed);

                let mut recorded = self.inner.recorded.lock().unwrap();
                let result = if self.inner.fail_log_events.load(Ordering::SeqCst) {
                    Err(Error::UnexpectedStatus(500))
                } else {
                    recorded.batches.push(RecordedBatch {
                        events: serde_json::from_value(body["events"].clone()).unwrap(),
                        metadata: serde_json::from_value(body["gatekitMetadata"].clone())
                            .unwrap(),
                    });
                    Ok(serde_json::Value::Null)
                };
                self.inner.changed.notify_all();
                result
            }
        }
    }
}
