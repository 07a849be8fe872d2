//! The deterministic scan-cycle engine (§4.3): drives one `Interpreter` at
//! a fixed period through the seven ordered steps, owns the I/O latency
//! queues, the watchdog, and the physics post-pass.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use shadowforge_core::{Error, Result};
use shadowforge_lang::AstNode;
use tokio::sync::mpsc;
use tracing::warn;

use crate::fault::{FaultInjector, FaultSpec};
use crate::interp::Interpreter;
use crate::value::Value;

/// Tuning knobs for the scan engine; the environment surface's config
/// loader (in `shadowforge-config`) builds one of these from `std::env`.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub scan_time_ms: u64,
    pub watchdog_limit_ms: u64,
    pub latency_base_ms: i64,
    pub latency_jitter_ms: i64,
    /// When false (default), integer overflow wraps at 16-bit signed
    /// range; when true, at `DINT` (32-bit signed) range.
    pub dint_range: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_time_ms: 10,
            watchdog_limit_ms: 50,
            latency_base_ms: 2,
            latency_jitter_ms: 0, // jitter is sampled by the caller, not the engine
            dint_range: false,
        }
    }
}

#[derive(Debug, Clone)]
struct InboxEntry {
    tag: String,
    value: Value,
    enqueue_ts: i64,
    maturity_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub tag: String,
    pub value: Value,
    pub ts: i64,
}

/// A physics pairing rule, kept data-driven per §4.3's explicit permission
/// to do so ("implementations may make the pairing table data-driven").
pub struct PhysicsRule {
    pub name: &'static str,
    pub apply: fn(&mut HashMap<String, Value>),
}

fn default_physics_table() -> Vec<PhysicsRule> {
    vec![
        PhysicsRule {
            name: "temperature",
            apply: |cells| {
                let heater = cells.get("Heater_Output").map(|v| v.as_real()).unwrap_or(0.0);
                let pv = cells.get("Temperature_PV").map(|v| v.as_real()).unwrap_or(0.0);
                let next = (pv + (heater / 100.0) * 0.3 - 0.05).clamp(0.0, 150.0);
                cells.insert("Temperature_PV".into(), Value::Real(next));
            },
        },
        PhysicsRule {
            name: "tank_level",
            apply: |cells| {
                let running = cells.get("Pump_Run").map(|v| v.as_bool()).unwrap_or(false);
                let pv = cells.get("Tank_Level").map(|v| v.as_real()).unwrap_or(0.0);
                let delta = if running { 0.5 } else { 0.0 };
                let next = (pv + delta - 0.15).clamp(0.0, 100.0);
                cells.insert("Tank_Level".into(), Value::Real(next));
            },
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Commands external callers serialise onto the scan loop (§5): they take
/// effect before step 1 of the next tick, except `Query` which is
/// read-only and answered outside the tick.
pub enum EngineCommand {
    SetVariable { tag: String, value: Value },
    InjectFault(FaultSpec),
    RemoveFault { target: String },
    Pause,
    Resume,
    Stop,
    Step,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    VariableUpdate { tag: String, value: Value, ts: i64 },
    SystemStatus { scan_count: u64, scan_time_ms: u64 },
    FaultStatus { target: String, active: bool },
    WatchdogTimeout { cycle: u64, elapsed_ms: u64 },
    Overflow { tag: String, cycle: u64 },
}

pub struct ScanEngine {
    interp: Interpreter,
    ast: AstNode,
    faults: FaultInjector,
    physics: Vec<PhysicsRule>,
    inbox: Vec<InboxEntry>,
    outbox: Vec<OutboxEntry>,
    config: ScanConfig,
    scan_count: u64,
    clock_ms: i64,
    state: RunState,
}

const INT_MIN_16: i64 = -32768;
const INT_MAX_16: i64 = 32767;
const INT_MIN_32: i64 = i32::MIN as i64;
const INT_MAX_32: i64 = i32::MAX as i64;

impl ScanEngine {
    pub fn new(ast: AstNode, config: ScanConfig) -> Result<Self> {
        let interp = Interpreter::load(&ast)?;
        Ok(Self {
            interp,
            ast,
            faults: FaultInjector::new(),
            physics: default_physics_table(),
            inbox: Vec::new(),
            outbox: Vec::new(),
            config,
            scan_count: 0,
            clock_ms: 0,
            state: RunState::Running,
        })
    }

    pub fn read_variable(&self, tag: &str) -> Option<&Value> {
        self.interp.read_variable(tag)
    }

    pub fn snapshot_variables(&self) -> HashMap<String, Value> {
        self.interp.snapshot_variables()
    }

    /// Enqueue an output/input delivery into the I/O latency queue; matures
    /// after `base ± jitter` (§4.3 step 2).
    pub fn enqueue_io(&mut self, tag: String, value: Value, jitter_ms: i64) {
        self.inbox.push(InboxEntry {
            tag,
            value,
            enqueue_ts: self.clock_ms,
            maturity_ms: self.config.latency_base_ms + jitter_ms,
        });
    }

    pub fn drain_outbox(&mut self) -> Vec<OutboxEntry> {
        std::mem::take(&mut self.outbox)
    }

    pub fn apply_command(&mut self, cmd: EngineCommand) -> Result<()> {
        match cmd {
            EngineCommand::SetVariable { tag, value } => {
                self.enqueue_io(tag, value, 0);
                Ok(())
            }
            EngineCommand::InjectFault(spec) => {
                self.faults.inject(self.clock_ms, spec);
                Ok(())
            }
            EngineCommand::RemoveFault { target } => {
                self.faults.remove(&target, self.clock_ms);
                Ok(())
            }
            EngineCommand::Pause => {
                self.state = RunState::Paused;
                Ok(())
            }
            EngineCommand::Resume => {
                self.state = RunState::Running;
                Ok(())
            }
            EngineCommand::Stop => {
                self.state = RunState::Stopped;
                Ok(())
            }
            EngineCommand::Step => {
                self.tick();
                Ok(())
            }
            EngineCommand::Reset => self.interp.reset(&self.ast),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run one full scan cycle: the seven ordered steps of §4.3. Returns
    /// the events a subscriber feed would emit from this tick.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.clock_ms += self.config.scan_time_ms as i64;
        self.scan_count += 1;

        // 1. Publish system variables.
        self.interp
            .write_variable("ScanTime_ms", Value::Int(self.config.scan_time_ms as i64));
        self.interp
            .write_variable("ScanCount", Value::Int(self.scan_count as i64));
        events.push(EngineEvent::SystemStatus {
            scan_count: self.scan_count,
            scan_time_ms: self.config.scan_time_ms,
        });

        // 2. Process the I/O latency inbox.
        self.drain_matured_inbox();

        // 3. Apply active fault injections.
        let mut cells = self.interp.snapshot_variables();
        self.faults.apply(self.clock_ms, &mut cells);
        for (tag, value) in cells {
            self.interp.write_variable(&tag, value);
        }

        // 4. Execute the program under a watchdog.
        self.interp.now_ms = self.clock_ms;
        let started = Instant::now();
        if let Err(e) = self.interp.step_once() {
            warn!(error = %e, "program execution faulted this cycle");
        }
        let elapsed = started.elapsed();
        if elapsed.as_millis() as u64 > self.config.watchdog_limit_ms {
            warn!(
                cycle = self.scan_count,
                elapsed_ms = elapsed.as_millis() as u64,
                "WATCHDOG_TIMEOUT"
            );
            events.push(EngineEvent::WatchdogTimeout {
                cycle: self.scan_count,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        // 5. Overflow wrap.
        self.wrap_overflowing_integers(&mut events);

        // 6. Queue outbound I/O.
        self.queue_outbound_io();

        // 7. Physics post-pass.
        let mut cells = self.interp.snapshot_variables();
        for rule in &self.physics {
            (rule.apply)(&mut cells);
        }
        for (tag, value) in cells {
            let rounded = round_value(value);
            self.interp.write_variable(&tag, rounded.clone());
            events.push(EngineEvent::VariableUpdate {
                tag,
                value: rounded,
                ts: self.clock_ms,
            });
        }

        events
    }

    fn drain_matured_inbox(&mut self) {
        let clock = self.clock_ms;
        let (mature, pending): (Vec<_>, Vec<_>) = self
            .inbox
            .drain(..)
            .partition(|e| clock - e.enqueue_ts >= e.maturity_ms);
        self.inbox = pending;
        // Deliver in enqueue order; keep only the most recent mature value
        // per tag (§4.3: "write the most recent mature value").
        let mut latest: HashMap<String, Value> = HashMap::new();
        for entry in mature {
            latest.insert(entry.tag, entry.value);
        }
        for (tag, value) in latest {
            self.interp.write_variable(&tag, value);
        }
    }

    fn wrap_overflowing_integers(&mut self, events: &mut Vec<EngineEvent>) {
        let (lo, hi) = if self.config.dint_range {
            (INT_MIN_32, INT_MAX_32)
        } else {
            (INT_MIN_16, INT_MAX_16)
        };
        let names: Vec<String> = self.interp.cell_names().cloned().collect();
        for name in names {
            if let Some(Value::Int(v)) = self.interp.read_variable(&name).cloned() {
                if v < lo || v > hi {
                    let range = hi - lo + 1;
                    let wrapped = lo + (v - lo).rem_euclid(range);
                    self.interp.write_variable(&name, Value::Int(wrapped));
                    events.push(EngineEvent::Overflow {
                        tag: name,
                        cycle: self.scan_count,
                    });
                }
            }
        }
    }

    fn queue_outbound_io(&mut self) {
        let names: Vec<String> = self.interp.cell_names().cloned().collect();
        for name in names {
            if is_output_tag(&name) {
                if let Some(value) = self.interp.read_variable(&name).cloned() {
                    self.outbox.push(OutboxEntry {
                        tag: name,
                        value,
                        ts: self.clock_ms,
                    });
                }
            }
        }
    }
}

fn is_output_tag(name: &str) -> bool {
    name.starts_with("Output") || name.ends_with("_OUT") || name.contains("OUTPUT")
}

/// All engine writes round numeric values to two decimal places to
/// suppress accumulated floating-point drift (§4.3).
fn round_value(value: Value) -> Value {
    match value {
        Value::Real(r) => Value::Real((r * 100.0).round() / 100.0),
        other => other,
    }
}

/// Drive the engine at a fixed period until `EngineCommand::Stop` is
/// applied, serialising queued commands onto the tick boundary per §5.
pub async fn run(
    mut engine: ScanEngine,
    mut commands: mpsc::Receiver<EngineCommand>,
    events: mpsc::Sender<EngineEvent>,
) -> Result<ScanEngine> {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(
        engine.config.scan_time_ms,
    ));
    loop {
        interval.tick().await;
        while let Ok(cmd) = commands.try_recv() {
            let stop = matches!(cmd, EngineCommand::Stop);
            engine
                .apply_command(cmd)
                .map_err(|e| Error::RuntimeError(e.to_string()))?;
            if stop {
                return Ok(engine);
            }
        }
        if engine.state() != RunState::Running {
            continue;
        }
        for event in engine.tick() {
            // Best-effort delivery: a slow subscriber drops messages
            // rather than stalling the producer (§9 Design Notes).
            let _ = events.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_lang::{parse, tokenize};

    fn engine(src: &str) -> ScanEngine {
        let ast = parse(tokenize(src).unwrap()).unwrap();
        ScanEngine::new(ast, ScanConfig::default()).unwrap()
    }

    #[test]
    fn scan_count_and_scan_time_are_published() {
        let mut eng = engine("VAR A : INT := 0; END_VAR");
        for _ in 0..5 {
            eng.tick();
        }
        assert_eq!(eng.read_variable("ScanCount"), Some(&Value::Int(5)));
        assert_eq!(eng.read_variable("ScanTime_ms"), Some(&Value::Int(10)));
    }

    #[test]
    fn overflow_wraps_at_16_bit_boundary() {
        let mut eng = engine("VAR A : INT := 32767; END_VAR A := A + 1;");
        let events = eng.tick();
        assert_eq!(eng.read_variable("A"), Some(&Value::Int(INT_MIN_16)));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Overflow { .. })));
    }

    #[test]
    fn output_tag_is_queued_to_outbox() {
        let mut eng = engine("VAR Output_Valve : BOOL := TRUE; END_VAR");
        eng.tick();
        let drained = eng.drain_outbox();
        assert!(drained.iter().any(|e| e.tag == "Output_Valve"));
    }
}
