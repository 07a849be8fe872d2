//! Fault injection surface (§4.4): VALUE_DRIFT, LOCK_VALUE, FORCE_IO_ERROR.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    ValueDrift,
    LockValue,
    ForceIoError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultSpec {
    pub target: String,
    pub kind: FaultKind,
    pub parameter: f64,
    pub duration_ms: i64,
    /// Defers activation relative to the scan loop.
    pub delay_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveFault {
    pub id: String,
    pub target: String,
    pub kind: FaultKind,
    pub parameter: f64,
    pub start_ts: i64,
    pub end_ts: i64,
    /// `VALUE_DRIFT`: the value captured at first activation.
    captured_value: Option<f64>,
    /// `VALUE_DRIFT`: the timestamp of the last application.
    last_update: i64,
}

/// Keyed by `(target, kind)`; only one fault of each kind may be active on
/// a given tag at a time — a new injection replaces the existing one.
#[derive(Debug, Default)]
pub struct FaultInjector {
    active: HashMap<(String, FaultKindKey), ActiveFault>,
    pending: Vec<(i64, FaultSpec)>,
    history: Vec<ActiveFault>,
    next_id: u64,
}

type FaultKindKey = u8;

fn kind_key(kind: FaultKind) -> FaultKindKey {
    match kind {
        FaultKind::ValueDrift => 0,
        FaultKind::LockValue => 1,
        FaultKind::ForceIoError => 2,
    }
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an injection, honouring `delay_ms` (§4.4).
    pub fn inject(&mut self, now_ms: i64, spec: FaultSpec) {
        let activate_at = now_ms + spec.delay_ms.max(0);
        self.pending.push((activate_at, spec));
    }

    pub fn remove(&mut self, target: &str, now_ms: i64) {
        let keys: Vec<_> = self
            .active
            .keys()
            .filter(|(t, _)| t == target)
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut fault) = self.active.remove(&key) {
                fault.end_ts = now_ms;
                self.history.push(fault);
            }
        }
    }

    pub fn active_faults(&self) -> impl Iterator<Item = &ActiveFault> {
        self.active.values()
    }

    /// Promote any pending injections whose activation time has arrived,
    /// then apply every active fault to the runtime cell table, then
    /// evict and log anything that has expired.
    pub fn apply(&mut self, now_ms: i64, cells: &mut HashMap<String, Value>) {
        self.activate_due(now_ms);

        for fault in self.active.values_mut() {
            match fault.kind {
                FaultKind::ValueDrift => {
                    let captured = *fault.captured_value.get_or_insert_with(|| {
                        cells.get(&fault.target).map(|v| v.as_real()).unwrap_or(0.0)
                    });
                    let elapsed = (now_ms - fault.last_update).max(0) as f64;
                    let base = cells
                        .get(&fault.target)
                        .map(|v| v.as_real())
                        .unwrap_or(captured);
                    let new_value = base + fault.parameter * elapsed / 1000.0;
                    cells.insert(fault.target.clone(), Value::Real(new_value));
                    fault.last_update = now_ms;
                }
                FaultKind::LockValue => {
                    let captured = *fault
                        .captured_value
                        .get_or_insert_with(|| cells.get(&fault.target).map(|v| v.as_real()).unwrap_or(0.0));
                    cells.insert(fault.target.clone(), Value::Real(captured));
                }
                FaultKind::ForceIoError => {
                    cells.insert(format!("{}_ERROR", fault.target), Value::Bool(true));
                }
            }
        }

        self.expire(now_ms, cells);
    }

    fn activate_due(&mut self, now_ms: i64) {
        let mut still_pending = Vec::new();
        for (activate_at, spec) in self.pending.drain(..) {
            if activate_at <= now_ms {
                self.next_id += 1;
                let fault = ActiveFault {
                    id: format!("fault-{}", self.next_id),
                    target: spec.target.clone(),
                    kind: spec.kind,
                    parameter: spec.parameter,
                    start_ts: now_ms,
                    end_ts: now_ms + spec.duration_ms,
                    captured_value: None,
                    last_update: now_ms,
                };
                self.active.insert((spec.target, kind_key(spec.kind)), fault);
            } else {
                still_pending.push((activate_at, spec));
            }
        }
        self.pending = still_pending;
    }

    fn expire(&mut self, now_ms: i64, cells: &mut HashMap<String, Value>) {
        let expired: Vec<_> = self
            .active
            .iter()
            .filter(|(_, f)| now_ms >= f.end_ts)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(fault) = self.active.remove(&key) {
                if fault.kind == FaultKind::ForceIoError {
                    cells.insert(format!("{}_ERROR", fault.target), Value::Bool(false));
                }
                self.history.push(fault);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_drift_advances_over_time() {
        let mut injector = FaultInjector::new();
        let mut cells = HashMap::new();
        cells.insert("Temperature_PV".to_string(), Value::Real(20.0));
        injector.inject(
            0,
            FaultSpec {
                target: "Temperature_PV".into(),
                kind: FaultKind::ValueDrift,
                parameter: 2.0,
                duration_ms: 3000,
                delay_ms: 0,
            },
        );
        injector.apply(0, &mut cells);
        injector.apply(3000, &mut cells);
        let v = cells.get("Temperature_PV").unwrap().as_real();
        assert!((v - 26.0).abs() < 0.01, "got {v}");

        // past the deadline the fault is gone from the active set
        injector.apply(3200, &mut cells);
        assert_eq!(injector.active_faults().count(), 0);
    }

    #[test]
    fn force_io_error_sets_and_clears_companion_tag() {
        let mut injector = FaultInjector::new();
        let mut cells = HashMap::new();
        injector.inject(
            0,
            FaultSpec {
                target: "Pump1".into(),
                kind: FaultKind::ForceIoError,
                parameter: 0.0,
                duration_ms: 100,
                delay_ms: 0,
            },
        );
        injector.apply(0, &mut cells);
        assert_eq!(cells.get("Pump1_ERROR").unwrap().as_bool(), true);
        injector.apply(200, &mut cells);
        assert_eq!(cells.get("Pump1_ERROR").unwrap().as_bool(), false);
    }

    #[test]
    fn new_injection_replaces_existing_of_same_kind() {
        let mut injector = FaultInjector::new();
        let mut cells = HashMap::new();
        cells.insert("A".into(), Value::Real(1.0));
        injector.inject(
            0,
            FaultSpec {
                target: "A".into(),
                kind: FaultKind::LockValue,
                parameter: 0.0,
                duration_ms: 10_000,
                delay_ms: 0,
            },
        );
        injector.apply(0, &mut cells);
        injector.inject(
            10,
            FaultSpec {
                target: "A".into(),
                kind: FaultKind::LockValue,
                parameter: 0.0,
                duration_ms: 10_000,
                delay_ms: 0,
            },
        );
        injector.apply(10, &mut cells);
        assert_eq!(injector.active_faults().count(), 1);
    }
}
