//! The subscriber event stream (§4.10, §5): best-effort delivery over a
//! broadcast channel, transport-agnostic (no axum, no WebSocket framing —
//! that framing is an external collaborator).

use serde::{Deserialize, Serialize};
use shadowforge_runtime::Value;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// The five event kinds named in §4.10.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    VariableUpdate { tag: String, value: Value, ts: i64 },
    BulkUpdate { updates: Vec<(String, Value)>, ts: i64 },
    SystemStatus { scan_count: u64, scan_time_ms: u64 },
    FaultStatus { target: String, active: bool },
    ScenarioStep { name: String, progress_percent: u8 },
}

/// Broadcasts tick-derived events to every subscriber. A slow subscriber
/// that falls behind the channel capacity loses messages rather than
/// stalling the producer (§5: "best-effort... may be dropped or
/// truncated at the sync surface's discretion").
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<SyncEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to every subscriber. Never blocks; a channel with
    /// no receivers simply drops the event.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate one tick's `EngineEvent`s into the public `SyncEvent` wire
/// shape and publish them, collapsing consecutive `VariableUpdate`s at
/// the same timestamp into a single `BulkUpdate` when there is more than
/// one (§4.10's `bulkUpdate`).
pub fn publish_tick(broadcaster: &Broadcaster, events: &[shadowforge_runtime::EngineEvent]) {
    use shadowforge_runtime::EngineEvent;

    let mut variable_updates = Vec::new();
    for event in events {
        match event {
            EngineEvent::VariableUpdate { tag, value, ts } => {
                variable_updates.push((tag.clone(), value.clone(), *ts));
            }
            EngineEvent::SystemStatus {
                scan_count,
                scan_time_ms,
            } => {
                broadcaster.publish(SyncEvent::SystemStatus {
                    scan_count: *scan_count,
                    scan_time_ms: *scan_time_ms,
                });
            }
            EngineEvent::FaultStatus { target, active } => {
                broadcaster.publish(SyncEvent::FaultStatus {
                    target: target.clone(),
                    active: *active,
                });
            }
            EngineEvent::WatchdogTimeout { .. } | EngineEvent::Overflow { .. } => {}
        }
    }

    if variable_updates.len() == 1 {
        let (tag, value, ts) = variable_updates.remove(0);
        broadcaster.publish(SyncEvent::VariableUpdate { tag, value, ts });
    } else if variable_updates.len() > 1 {
        let ts = variable_updates.last().map(|(_, _, ts)| *ts).unwrap_or(0);
        broadcaster.publish(SyncEvent::BulkUpdate {
            updates: variable_updates.into_iter().map(|(t, v, _)| (t, v)).collect(),
            ts,
        });
    }
}

/// Publish one rollout step's progress as a `scenarioStep` event (§4.10).
/// Deploy rollout and scan-cycle ticks are the two producers of sync
/// events; this keeps the translation here instead of giving
/// `shadowforge-deploy` a dependency on this crate just to publish.
pub fn publish_deploy_step(broadcaster: &Broadcaster, step: &str, progress_percent: u8) {
    broadcaster.publish(SyncEvent::ScenarioStep {
        name: step.to_string(),
        progress_percent,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_runtime::EngineEvent;

    #[test]
    fn single_variable_update_is_not_bulked() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        publish_tick(
            &broadcaster,
            &[EngineEvent::VariableUpdate {
                tag: "A".into(),
                value: Value::Int(1),
                ts: 10,
            }],
        );
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, SyncEvent::VariableUpdate { .. }));
    }

    #[test]
    fn multiple_variable_updates_collapse_to_bulk() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        publish_tick(
            &broadcaster,
            &[
                EngineEvent::VariableUpdate {
                    tag: "A".into(),
                    value: Value::Int(1),
                    ts: 10,
                },
                EngineEvent::VariableUpdate {
                    tag: "B".into(),
                    value: Value::Int(2),
                    ts: 10,
                },
            ],
        );
        let event = rx.try_recv().unwrap();
        match event {
            SyncEvent::BulkUpdate { updates, .. } => assert_eq!(updates.len(), 2),
            other => panic!("expected bulk update, got {other:?}"),
        }
    }

    #[test]
    fn deploy_step_publishes_scenario_step() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        publish_deploy_step(&broadcaster, "compile", 60);
        match rx.try_recv().unwrap() {
            SyncEvent::ScenarioStep { name, progress_percent } => {
                assert_eq!(name, "compile");
                assert_eq!(progress_percent, 60);
            }
            other => panic!("expected scenario step, got {other:?}"),
        }
    }

    #[test]
    fn a_lagging_subscriber_is_dropped_rather_than_blocking() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        for i in 0..(CHANNEL_CAPACITY + 10) {
            broadcaster.publish(SyncEvent::SystemStatus {
                scan_count: i as u64,
                scan_time_ms: 10,
            });
        }
        let result = rx.try_recv();
        assert!(matches!(result, Err(broadcast::error::TryRecvError::Lagged(_))) || result.is_ok());
    }
}
