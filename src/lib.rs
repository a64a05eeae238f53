//! Dokimasia - Assessment Merge-and-Validation Engine
//!
//! A Rust engine for developmental-assessment monitoring that provides:
//! - Cross-source record merging with strict cohort isolation
//! - Per-task termination/timeout state machines (stage gates,
//!   consecutive-incorrect streaks, screener subsets, timed windows)
//! - Bulk validation-cache building over a bounded worker pool
//! - Injectable cache storage with TTL-checked reads
//!
//! # Architecture
//!
//! The engine is organized into several layers:
//! - **Types**: Core data structures (RawRecord, MergedRecord, cohorts)
//! - **Merge**: Cross-source reconciliation ("earliest non-empty wins")
//! - **Catalog**: Immutable task schemas and set definitions
//! - **Validator**: Per-task completion/accuracy/termination results
//! - **Cache**: Population-scale precomputation and entry lifecycle
//!
//! Fetching raw records from the collection sources and persisting cache
//! entries beyond the in-memory store are the caller's responsibility;
//! the core is synchronous computation between those two edges.
//!
//! # Example
//!
//! ```ignore
//! use dokimasia::{
//!     MemoryStore, RecordMerger, StudentRef, TaskCatalog, ValidationCacheBuilder,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Arc::new(TaskCatalog::from_json(&catalog_json)?);
//!
//!     // Merge the two source exports into canonical records
//!     let outcome = RecordMerger::merge(form_records, survey_records);
//!
//!     // Precompute validation results for the whole population
//!     let store = Arc::new(MemoryStore::new());
//!     let builder = ValidationCacheBuilder::new(catalog, Arc::clone(&store));
//!     let report = builder
//!         .build(students, outcome.records, &CancellationToken::new())
//!         .await?;
//!     println!("built {} entries", report.built);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod error;
pub mod merge;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use cache::{
    read_with_ttl, BuildReport, BuilderOptions, CacheRead, CacheStore, MemoryStore, SetStatus,
    StudentRef, StudentValidationCacheEntry, ValidationCacheBuilder,
};
pub use catalog::{
    MemberCondition, Question, QuestionKind, SetDefinition, SetMember, StageGate, TaskCatalog,
    TaskDefinition, TerminationRule,
};
pub use error::{EngineError, Result};
pub use merge::{ConflictEntry, MergeOutcome, MergeSkip, RecordMerger, SkipReason};
pub use types::{
    Cohort, FieldName, FieldValue, MergedRecord, RawRecord, ResolvedValue, ScalarValue, SchoolYear,
    SetId, Source, StudentId, TaskId,
};
pub use validator::{QuestionResult, TaskValidationResult, TaskValidator};
