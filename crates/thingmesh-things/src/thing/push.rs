//! Delivery of requested values to the bound bridge.
//!
//! Every applied output band change ends up here. Changes made before the
//! scheduled push task starts are coalesced into one batch; the output band
//! is cleared once every push in flight has completed.
//!
//! The in-flight counter and the output band share the state lock: a push is
//! scheduled in the same critical section as the merge that produced it, and
//! the last completion clears the band in the same critical section as its
//! decrement.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::bridge::{Bridge, BridgeError};
use crate::events::Band;

use super::dispatch::Notification;
use super::state::ThingState;
use super::Thing;

/// What an applied output band change needs once the state lock is released.
pub(super) enum PushPlan {
    /// Merged into a batch that has not been handed to the bridge yet
    Coalesced,
    /// A new batch was counted; its task must be spawned
    Start(Arc<dyn Bridge>),
    /// Nothing can take the values; the band was cleared
    Abandoned,
}

impl Thing {
    /// The bridge output band changes should go to, if it can take them.
    pub(super) fn push_target(&self) -> Option<Arc<dyn Bridge>> {
        self.bridge().filter(|bridge| bridge.reachable())
    }

    /// Schedule applied changes. Runs under the state lock taken for the merge.
    pub(super) fn plan_push(
        &self,
        state: &mut ThingState,
        target: Option<Arc<dyn Bridge>>,
        changes: &[(usize, Value)],
    ) -> PushPlan {
        let Some(bridge) = target else {
            state.clear_ostate();
            return PushPlan::Abandoned;
        };

        let attributes = self.attributes();
        let values: Map<String, Value> = changes
            .iter()
            .map(|(index, value)| {
                let attribute = &attributes[*index];
                (attribute.code().to_string(), attribute.to_device(value))
            })
            .collect();

        if let Some(pending) = state.pending.as_mut() {
            pending.extend(values);
            debug!(pushes = state.pushes, "Coalesced into scheduled push");
            return PushPlan::Coalesced;
        }
        state.pending = Some(values);
        state.pushes += 1;
        PushPlan::Start(bridge)
    }

    /// Act on a plan once the state lock is released.
    pub(super) fn follow_push(&self, plan: PushPlan) {
        match plan {
            PushPlan::Coalesced => {}
            PushPlan::Start(bridge) => {
                let thing = self.clone();
                tokio::spawn(async move { thing.run_push(bridge).await });
            }
            PushPlan::Abandoned => {
                debug!(thing_id = ?self.thing_id(), bound = self.bridge().is_some(), "No reachable bridge, abandoning requested values");
                self.ostate_cleared();
            }
        }
    }

    async fn run_push(self, bridge: Arc<dyn Bridge>) {
        let values = self.inner.state.lock().pending.take().unwrap_or_default();
        let thing_id = self.thing_id();
        debug!(thing_id = ?thing_id, bridge = %bridge.name(), values = ?values, "Pushing");

        let outcome = {
            let bridge = bridge.clone();
            let mut call = tokio::spawn(async move { bridge.push(values).await });
            match self.inner.config.push_timeout() {
                Some(limit) => match tokio::time::timeout(limit, &mut call).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        call.abort();
                        Ok(Err(BridgeError::Timeout(limit.as_millis() as u64)))
                    }
                },
                None => call.await,
            }
        };

        match outcome {
            Ok(Ok(())) => debug!(thing_id = ?thing_id, bridge = %bridge.name(), "Push completed"),
            Ok(Err(e)) => error!(thing_id = ?thing_id, bridge = %bridge.name(), error = %e, "Push failed"),
            Err(e) => error!(thing_id = ?thing_id, bridge = %bridge.name(), error = %e, "Bridge panicked during push"),
        }
        self.complete_push();
    }

    fn complete_push(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            state.pushes = match state.pushes.checked_sub(1) {
                Some(pushes) => pushes,
                None => panic!("push completed more often than it was scheduled"),
            };
            let drained = state.pushes == 0;
            if drained {
                state.clear_ostate();
            }
            drained
        };
        if drained {
            self.ostate_cleared();
        }
    }

    /// Reset the output band and raise an `ostate` event.
    pub(super) fn clear_ostate(&self) {
        self.inner.state.lock().clear_ostate();
        self.ostate_cleared();
    }

    fn ostate_cleared(&self) {
        self.queue(Notification::Band {
            band: Band::Ostate,
            changes: Vec::new(),
            combined: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use thingmesh_core::EngineConfig;

    use crate::bridges::MockBridge;
    use crate::{Attribute, Model, StateBand, Thing};

    fn thing() -> Thing {
        let model = Model::builder("dimmer")
            .attribute(
                Attribute::from_purpose(":brightness")
                    .integer()
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        Thing::new(Arc::new(model), EngineConfig::default())
    }

    /// Some requested value is held whenever a push is counted in flight.
    fn consistent(thing: &Thing) -> bool {
        let state = thing.inner.state.lock();
        state.pushes == 0 || state.slots.iter().any(|slot| !slot.ovalue.is_null())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counter_and_band_move_together() {
        let thing = thing();
        thing.bind_bridge(Arc::new(MockBridge::new("dimmer")));

        let done = Arc::new(AtomicBool::new(false));
        let checker = {
            let thing = thing.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let mut violations = 0;
                while !done.load(Ordering::Relaxed) {
                    if !consistent(&thing) {
                        violations += 1;
                    }
                    tokio::task::yield_now().await;
                }
                violations
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let thing = thing.clone();
                tokio::spawn(async move {
                    for round in 0..2_000 {
                        thing.set(":brightness", writer * 10_000 + round);
                        if round % 64 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        done.store(true, Ordering::Relaxed);
        assert_eq!(checker.await.unwrap(), 0);

        for _ in 0..100 {
            if thing.pushes_in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(thing.pushes_in_flight(), 0);
        assert_eq!(thing.state(StateBand::Ostate)["brightness"], json!(null));
    }
}
