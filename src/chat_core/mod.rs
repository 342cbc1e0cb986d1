//! Analytics-aware chat orchestration.
//!
//! `ChatPipeline` is the entry point. Everything else is a stage it drives:
//! intent classification, deterministic and planner-driven queries, cached
//! execution, anomaly screening and context assembly.

pub mod anomaly;
pub mod context;
pub mod dates;
pub mod digest;
pub mod errors;
pub mod executor;
pub mod intent;
pub mod keywords;
pub mod orchestrator;
pub mod planner;
pub mod query_templates;
pub mod query_validator;
pub mod text;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use anomaly::AnomalyDetector;
pub use context::{ContextAssembler, ContextInputs, ScreenedResult};
pub use dates::DateRangeExtractor;
pub use digest::DigestBuilder;
pub use errors::{ChatError, PlannerError};
pub use executor::QueryExecutor;
pub use intent::IntentResolver;
pub use keywords::{KeywordCategory, KeywordClassifier, KeywordHits};
pub use orchestrator::ChatPipeline;
pub use planner::PlannerGateway;
pub use query_templates::DeterministicQueryBuilder;
pub use query_validator::QueryValidator;
pub use types::{
    ChatReply, ChatRequest, CurrentPage, Intent, IntentDescriptor, PageType, Query, QueryKind,
    QueryResult, SectionContext, Target,
};
