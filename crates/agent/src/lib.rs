//! The orchestration layer: context assembly, the risk-gated tool loop,
//! and per-conversation sessions.
//!
//! The pipeline for one turn runs affinity, retrieval, assembly, the loop,
//! and the archiver in that order; [`session::Session::take_turn`] is the
//! single entry point.

pub mod context;
pub mod session;
pub mod turn_loop;

pub use context::{AssembledPrompt, AssemblyInput, ContextAssembler};
pub use session::{Session, SessionConfig, SessionDeps, SessionManager};
pub use turn_loop::{
    AutoApprove, AutoDeny, ConfirmationGate, TurnLoop, TurnLoopConfig, TurnLoopResult,
};
