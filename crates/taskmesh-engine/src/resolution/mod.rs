//! Resolution planning and execution.
//!
//! The planner maps detected cycles to deterministic strategy and prevention
//! lists; the executor applies a selected strategy by calling back into the
//! task-mutation collaborator, containing per-mutation failures and pacing
//! the fallback chain.

pub mod executor;
pub mod planner;

pub use executor::ResolutionExecutor;
