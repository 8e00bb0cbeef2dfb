//! Context aggregation for Skylark.
//!
//! Assembles the bounded, immutable `ContextSnapshot` handed to the
//! orchestrator: recent channel history, the reply chain for direct
//! replies, and inline summaries of recognized links.

pub mod aggregator;
pub mod links;

pub use aggregator::{AggregatorOptions, ContextAggregator};
pub use links::{HttpLinkResolver, LinkResolver, extract_urls};
