//! The ST interpreter, deterministic scan-cycle engine, and fault
//! injection surface.

pub mod engine;
pub mod fault;
pub mod interp;
pub mod value;

pub use engine::{EngineCommand, EngineEvent, RunState, ScanConfig, ScanEngine};
pub use fault::{ActiveFault, FaultInjector, FaultKind, FaultSpec};
pub use interp::Interpreter;
pub use value::{FbInstance, Value};
