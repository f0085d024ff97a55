//! # Gremlin Core
//!
//! Core library for Gremlin, a single-shot chaos experiment runner.
//! Provides the reverse dependency graph, upstream resolution, trace
//! statistics, the experiment state machine and controller, clients for the
//! trace and fault services, configuration, and error types.

pub mod callback;
pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod guard;
pub mod selection;
pub mod sources;
pub mod stats;
pub mod types;

// Re-export commonly used types at the crate root.
pub use callback::{ExperimentCallback, NoOpCallback, RecordingCallback, TracingCallback};
pub use clients::{
    FaultClient, HttpFaultClient, JaegerTraceClient, MockFaultClient, MockTraceClient,
    TraceClient,
};
pub use config::{
    ConfigOverrides, ExperimentConfig, GremlinConfig, SelectionPolicy, ServiceEndpointConfig,
};
pub use controller::{
    CleanupOutcome, Collaborators, ExperimentAborted, ExperimentController, ExperimentPlan,
    ExperimentReport, PartialResults, plan,
};
pub use error::{
    ConfigError, DataSourceError, ExperimentError, InvalidInputError, UpstreamServiceError,
};
pub use experiment::{Experiment, ExperimentId, ExperimentState};
pub use graph::{DependencyGraph, UpstreamSet, resolve_transitive_upstream};
pub use guard::FaultGuard;
pub use selection::{
    FirstRecordSelector, FixedTargetSelector, MostFrequentSelector, TargetSelector, selector_for,
};
pub use sources::{
    CsvEdgeSource, CsvServiceSource, EdgeSource, ServiceSource, StaticEdgeSource,
    StaticServiceSource,
};
pub use stats::{NodeStats, StatsSummary, summarize};
pub use types::{Edge, Phase, ServiceNode, ServiceRecord, TimeWindow, TraceOutcome};
