//! The deployment state machine: safety checks, approval gating, the
//! ordered rollout script, and rollback (§4.9).

pub mod checks;
pub mod engine;

pub use checks::{checks_passed, run_safety_checks, CheckInput};
pub use engine::{
    cancel_deployment, create_deployment, execute_rollback, pause_deployment, record_check_outcome,
    resume_deployment, start_deployment, submit_approval, AlwaysHealthy, DeployEvent, HealthChecker,
};
