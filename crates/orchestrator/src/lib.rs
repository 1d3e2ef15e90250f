//! Generation Orchestrator - from raw prompt to session-store mutations
//!
//! The single entry point [`Orchestrator::generate`] turns a prompt plus a
//! requested output kind into store mutations, coordinating with the
//! generation backend. One request at a time: concurrent submissions are
//! ignored, never queued or cancelled.

pub mod engine;

pub use engine::{GenerateOutcome, Orchestrator, RequestPhase};
