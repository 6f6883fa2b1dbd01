//! `ah-orchestration` - multi-agent patterns over the provider adapters.
//!
//! Subagent spawning with isolated context, bounded-concurrency parallel
//! execution, maker-checker verification, and streaming roundtables.

pub mod maker_checker;
pub mod parallel;
pub mod roundtable;
pub mod subagent;

pub use maker_checker::{MakerChecker, VerificationResult};
pub use parallel::{ParallelExecutor, ParallelResult, ParallelTask};
pub use roundtable::{RoundtableEvent, RoundtableService, RoundtableSession};
pub use subagent::{SubagentConfig, SubagentManager, SubagentResult, SubagentStatus};
