//! `setVariable`/`injectFault`/`removeFault`/`pushLogic` (§4.10), adapted
//! from the claim/complete/fail idiom of a job queue to an in-process
//! `mpsc` command channel drained at the top of each scan tick (§5: the
//! scan loop is single-writer per process, so commands never round-trip
//! through a database on the hot path).

use shadowforge_core::{model::Vendor, Error, Result};
use shadowforge_runtime::{EngineCommand, FaultSpec, Value};
use tokio::sync::mpsc;

/// One line/column/severity/message issue from `logic.validate` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub line: u32,
    pub column: u32,
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
}

/// Syntax-validate ST source (§6 `logic.validate`), independent of any
/// live push.
pub fn validate(content: &str, _vendor: Vendor) -> ValidationOutcome {
    match shadowforge_lang::tokenize(content) {
        Err(e) => ValidationOutcome {
            is_valid: false,
            issues: vec![ValidationIssue {
                line: e.pos.line,
                column: e.pos.column,
                severity: IssueSeverity::Error,
                message: e.to_string(),
            }],
        },
        Ok(tokens) => match shadowforge_lang::parse(tokens) {
            Ok(_) => ValidationOutcome {
                is_valid: true,
                issues: Vec::new(),
            },
            Err(e) => ValidationOutcome {
                is_valid: false,
                issues: vec![ValidationIssue {
                    line: e.pos.line,
                    column: e.pos.column,
                    severity: IssueSeverity::Error,
                    message: e.to_string(),
                }],
            },
        },
    }
}

const LIVE_PUSH_SIZE_WARNING_BYTES: usize = 200_000;
const EMERGENCY_MARKERS: &[&str] = &["ESTOP", "EMERGENCY", "E_STOP"];
const TODO_MARKERS: &[&str] = &["TODO", "FIXME"];

/// Advisory warnings surfaced on a live `pushLogic` (§4.10): emergency-
/// system references, oversized content, `TODO`/`FIXME` markers. These
/// never block the push — only a syntax error does.
pub fn live_push_warnings(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let upper = content.to_uppercase();

    if EMERGENCY_MARKERS.iter().any(|m| upper.contains(m)) {
        warnings.push("content references an emergency-system tag".to_string());
    }
    if content.len() > LIVE_PUSH_SIZE_WARNING_BYTES {
        warnings.push(format!(
            "content is {} bytes, over the {}-byte advisory threshold",
            content.len(),
            LIVE_PUSH_SIZE_WARNING_BYTES
        ));
    }
    if TODO_MARKERS.iter().any(|m| upper.contains(m)) {
        warnings.push("content contains a TODO/FIXME marker".to_string());
    }
    warnings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTarget {
    Shadow,
    Live,
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub validation: ValidationOutcome,
    pub warnings: Vec<String>,
}

/// Validate then (for a `Live` target) collect advisory warnings. The
/// caller is responsible for actually swapping the active program once
/// `validation.is_valid` holds — this crate validates and advises, it
/// does not own the persisted "active program" pointer.
pub fn push_logic(content: &str, vendor: Vendor, target: PushTarget) -> Result<PushOutcome> {
    let validation = validate(content, vendor);
    if !validation.is_valid {
        return Err(Error::ValidationError(
            "logic failed syntax validation".to_string(),
        ));
    }
    let warnings = match target {
        PushTarget::Live => live_push_warnings(content),
        PushTarget::Shadow => Vec::new(),
    };
    Ok(PushOutcome { validation, warnings })
}

/// The producer-side handle to a running scan loop's command channel.
/// Every method serialises one `EngineCommand` onto the queue the engine
/// drains at the top of its next tick (§5).
#[derive(Clone)]
pub struct CommandSink {
    commands: mpsc::Sender<EngineCommand>,
}

impl CommandSink {
    pub fn new(commands: mpsc::Sender<EngineCommand>) -> Self {
        Self { commands }
    }

    async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| Error::RuntimeError("scan loop command channel closed".to_string()))
    }

    /// Writes are queued through the same latency outbox used for output
    /// tags, regardless of direction (§5).
    pub async fn set_variable(&self, tag: impl Into<String>, value: Value) -> Result<()> {
        self.send(EngineCommand::SetVariable {
            tag: tag.into(),
            value,
        })
        .await
    }

    pub async fn inject_fault(&self, spec: FaultSpec) -> Result<()> {
        self.send(EngineCommand::InjectFault(spec)).await
    }

    pub async fn remove_fault(&self, target: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::RemoveFault {
            target: target.into(),
        })
        .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(EngineCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(EngineCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(EngineCommand::Stop).await
    }

    pub async fn step(&self) -> Result<()> {
        self.send(EngineCommand::Step).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(EngineCommand::Reset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_program_has_no_issues() {
        let outcome = validate("PROGRAM Main\nx := 1;\nEND_PROGRAM", Vendor::Neutral);
        assert!(outcome.is_valid);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn broken_program_reports_a_position() {
        let outcome = validate("IF x THEN", Vendor::Neutral);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.issues.len(), 1);
    }

    #[test]
    fn live_push_flags_emergency_and_todo_markers() {
        let content = "(* TODO: wire up ESTOP handling *)\nPROGRAM Main\nEND_PROGRAM";
        let warnings = live_push_warnings(content);
        assert!(warnings.iter().any(|w| w.contains("emergency")));
        assert!(warnings.iter().any(|w| w.contains("TODO")));
    }

    #[test]
    fn shadow_push_never_warns() {
        let outcome = push_logic(
            "(* TODO *) PROGRAM Main\nEND_PROGRAM",
            Vendor::Neutral,
            PushTarget::Shadow,
        )
        .unwrap();
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn invalid_push_is_rejected_before_any_warning_check() {
        let result = push_logic("IF x THEN", Vendor::Neutral, PushTarget::Live);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn command_sink_forwards_set_variable() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = CommandSink::new(tx);
        sink.set_variable("Pump1", Value::Bool(true)).await.unwrap();
        let cmd = rx.recv().await.unwrap();
        assert!(matches!(cmd, EngineCommand::SetVariable { .. }));
    }
}
