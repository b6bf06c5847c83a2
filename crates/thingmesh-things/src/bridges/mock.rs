//! In-memory bridge for tests and demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::{oneshot, Notify};

use thingmesh_core::vocab::keys;

use crate::bridge::{Bridge, BridgeError, BridgeResult, BridgeSink, ConnectOptions};

/// How a [`MockBridge`] answers pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushBehavior {
    /// Complete immediately
    Succeed,
    /// Fail immediately with a communication error
    Fail,
    /// Panic inside `push`
    Panic,
    /// Wait until [`MockBridge::complete_next`] is called
    Manual,
}

/// Mock bridge that records everything the engine asks of it.
pub struct MockBridge {
    name: String,
    meta: RwLock<Map<String, Value>>,
    reachable: AtomicBool,
    behavior: RwLock<PushBehavior>,
    quiet_secs: f64,
    pushes: Mutex<Vec<Map<String, Value>>>,
    waiting: Mutex<VecDeque<oneshot::Sender<BridgeResult<()>>>>,
    pushed: Notify,
    sink: Mutex<Option<BridgeSink>>,
    devices: Mutex<Vec<Arc<dyn Bridge>>>,
    connects: AtomicUsize,
    pulls: AtomicUsize,
}

impl MockBridge {
    /// Create a new mock bridge.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: RwLock::new(Map::new()),
            reachable: AtomicBool::new(true),
            behavior: RwLock::new(PushBehavior::Succeed),
            quiet_secs: 0.0,
            pushes: Mutex::new(Vec::new()),
            waiting: Mutex::new(VecDeque::new()),
            pushed: Notify::new(),
            sink: Mutex::new(None),
            devices: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
        }
    }

    /// Report `id` as the device's thing id in `meta`.
    pub fn with_thing_id(self, id: impl Into<String>) -> Self {
        self.with_meta(keys::THING_ID, Value::String(id.into()))
    }

    pub fn with_meta(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.write().insert(key.into(), value.into());
        self
    }

    pub fn with_behavior(self, behavior: PushBehavior) -> Self {
        *self.behavior.write() = behavior;
        self
    }

    pub fn with_quiet_secs(mut self, secs: f64) -> Self {
        self.quiet_secs = secs;
        self
    }

    /// Add a device to report on `discover`.
    pub fn with_device(self, device: Arc<dyn Bridge>) -> Self {
        self.devices.lock().push(device);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    pub fn set_behavior(&self, behavior: PushBehavior) {
        *self.behavior.write() = behavior;
    }

    /// Every batch pushed so far, in order.
    pub fn pushes(&self) -> Vec<Map<String, Value>> {
        self.pushes.lock().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }

    /// Manual pushes still waiting for completion.
    pub fn waiting(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Complete the oldest waiting manual push. Returns `false` when none
    /// was waiting.
    pub fn complete_next(&self, result: BridgeResult<()>) -> bool {
        match self.waiting.lock().pop_front() {
            Some(done) => done.send(result).is_ok(),
            None => false,
        }
    }

    /// Wait until at least `count` pushes have arrived.
    pub async fn wait_for_pushes(&self, count: usize) {
        loop {
            let notified = self.pushed.notified();
            if self.push_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Report values through the sink handed over on `connect`. Returns
    /// `false` when not connected.
    pub fn emit(&self, values: Option<Map<String, Value>>) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.pulled(values);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Bridge for MockBridge {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self, sink: BridgeSink) {
        let devices = self.devices.lock().clone();
        for device in devices {
            sink.discovered(device);
        }
    }

    async fn connect(&self, sink: BridgeSink, _options: &ConnectOptions) -> BridgeResult<()> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn disconnect(&self) -> f64 {
        self.sink.lock().take();
        self.quiet_secs
    }

    async fn push(&self, values: Map<String, Value>) -> BridgeResult<()> {
        self.pushes.lock().push(values);
        self.pushed.notify_waiters();

        let behavior = *self.behavior.read();
        match behavior {
            PushBehavior::Succeed => Ok(()),
            PushBehavior::Fail => Err(BridgeError::Communication("mock push failure".into())),
            PushBehavior::Panic => panic!("mock bridge panicked during push"),
            PushBehavior::Manual => {
                let (done, wait) = oneshot::channel();
                self.waiting.lock().push_back(done);
                wait.await.unwrap_or_else(|_| {
                    Err(BridgeError::Communication("completion dropped".into()))
                })
            }
        }
    }

    async fn pull(&self) {
        self.pulls.fetch_add(1, Ordering::Relaxed);
    }

    fn meta(&self) -> Map<String, Value> {
        self.meta.read().clone()
    }

    fn reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }
}
