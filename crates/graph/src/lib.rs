//! `ah-graph` - client for the knowledge-graph + vector backend.
//!
//! The hub does not own the graph database. This crate defines the
//! [`GraphStore`] trait - every graph read/write the core performs - a
//! production REST implementation ([`RestGraphClient`]) that talks to the
//! graph-memory service, and an in-memory double ([`testing::InMemoryGraph`])
//! used by the test suites of the crates above this one.

pub mod rest;
pub mod store;
pub mod testing;
pub mod types;

pub use rest::RestGraphClient;
pub use store::{GraphStore, UsageDelta, UtilityShift};
pub use types::{AddEpisodeRequest, AddEpisodeResult, EntityEdge, EpisodeNode};
