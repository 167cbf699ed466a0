//! Location research: resolve a place, gather evidence from free knowledge
//! sources, rank it by trust, and summarize it strictly from that evidence.

pub mod cache;
pub mod config;
pub mod engine;
pub mod entity;
pub mod gemini;
pub mod rank;
pub mod report;
pub mod sources;
pub mod summarize;
pub mod websearch;

pub const USER_AGENT: &str = concat!(
    "wanderlore/",
    env!("CARGO_PKG_VERSION"),
    " (location research)"
);

pub use engine::{Pipeline, ResearchRequest, ResearchResult, Researcher};
pub use entity::{Entity, EntityInput};
pub use sources::{AdapterContext, Citation, SourceAdapter, SourceType};
