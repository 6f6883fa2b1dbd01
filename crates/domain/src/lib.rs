//! `ah-domain` - shared types for the Agent Hub workspace.
//!
//! Every other crate depends on this one. It holds the common error type,
//! the provider-agnostic message/stream/completion unions, thinking levels,
//! memory scoping, and the configuration tree.

pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod scope;
pub mod stream;
pub mod thinking;
pub mod tier;
