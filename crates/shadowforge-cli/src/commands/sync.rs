//! `sync.*` (§6, §4.10): the live command surface. `pushLogic` validates
//! and advises without needing a running engine; the rest require one
//! attached to the same process, which a one-shot CLI invocation never
//! has — those are left as stubs, same as the teacher's unimplemented
//! remote commands.

use clap::Subcommand;
use shadowforge_sync::{push_logic, PushTarget};

use super::parse_vendor;

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Validate then, for a live target, collect advisory warnings on a
    /// piece of logic.
    PushLogic {
        file: std::path::PathBuf,
        #[arg(long, default_value = "neutral")]
        vendor: String,
        #[arg(long, default_value = "shadow")]
        target: String,
    },
    /// Write a tag's value on the live controller.
    SetVariable { tag: String, value: String },
    /// Inject a fault into the running scan loop.
    InjectFault { target: String, kind: String },
    /// Clear a previously injected fault.
    RemoveFault { target: String },
    /// Subscribe to the live tick event stream.
    StreamTags,
    /// Report the running engine's scan status.
    Status,
}

fn parse_target(raw: &str) -> anyhow::Result<PushTarget> {
    match raw.to_ascii_lowercase().as_str() {
        "shadow" => Ok(PushTarget::Shadow),
        "live" => Ok(PushTarget::Live),
        other => Err(anyhow::anyhow!("unknown push target {other:?}")),
    }
}

const NEEDS_ATTACHED_ENGINE: &str =
    "not available from a standalone CLI invocation: this command drains an in-process \
     command channel owned by a running scan engine, and the CLI has no running engine to \
     attach to";

pub async fn run(command: SyncCommands) -> anyhow::Result<()> {
    match command {
        SyncCommands::PushLogic { file, vendor, target } => {
            let content = std::fs::read_to_string(&file)?;
            let outcome = push_logic(&content, parse_vendor(&vendor)?, parse_target(&target)?)?;
            println!("pushed ({} warning(s))", outcome.warnings.len());
            for warning in &outcome.warnings {
                println!("  warning: {warning}");
            }
        }
        SyncCommands::SetVariable { .. } => println!("{NEEDS_ATTACHED_ENGINE}"),
        SyncCommands::InjectFault { .. } => println!("{NEEDS_ATTACHED_ENGINE}"),
        SyncCommands::RemoveFault { .. } => println!("{NEEDS_ATTACHED_ENGINE}"),
        SyncCommands::StreamTags => println!("{NEEDS_ATTACHED_ENGINE}"),
        SyncCommands::Status => println!("{NEEDS_ATTACHED_ENGINE}"),
    }
    Ok(())
}
