pub mod consolidate;
pub mod doctor;
pub mod extract;
pub mod ingest;
pub mod optimize;
pub mod run_agent;
pub mod stats;
pub mod stream_cmd;
