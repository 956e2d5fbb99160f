//! # Verdict
//!
//! Agent evaluation connectors: normalize four structurally different wire
//! protocols (SSE streaming, synchronous REST, child-process JSON lines, and
//! a deterministic simulator) into one canonical step sequence, and aggregate
//! run-level pass/fail statistics over partially-completed,
//! asynchronously-judged evaluation runs.
//!
//! ## Design principles
//!
//! - **One trajectory, many protocols**: each [`Connector`] translates its
//!   wire format into ordered [`TrajectoryStep`]s; callers never see protocol
//!   detail beyond the raw events preserved for replay.
//! - **Emission order is authoritative**: steps and raw events are delivered
//!   on their channels in the order the underlying events/lines arrived.
//! - **Per-call state**: converter buffers and line splitters live inside a
//!   single `execute()` call; concurrent calls cannot corrupt each other.
//! - **Guaranteed release**: stream readers and spawned processes are cleaned
//!   up on every exit path, including caller abandonment.
//! - **Recover locally, surface globally**: malformed lines and argument
//!   buffers degrade to raw content; transport failures propagate with
//!   provider detail and whatever partial trajectory exists.
//!
//! ## Main modules
//!
//! - [`trajectory`]: [`TrajectoryStep`], [`StepType`], [`StepStatus`],
//!   [`ConnectorResponse`]: the canonical data model.
//! - [`connector`]: the [`Connector`] capability contract, shared auth/header
//!   helpers, and the four protocol implementations
//!   ([`StreamingConnector`], [`RestConnector`], [`SubprocessConnector`],
//!   [`MockConnector`]).
//! - [`convert`]: [`TrajectoryConverter`] folds stream lifecycle events into
//!   steps (delta coalescing, tool-call argument assembly, latency).
//! - [`registry`]: [`ConnectorRegistry`] resolves a discriminant to a
//!   connector with the documented streaming fallback.
//! - [`stats`]: [`compute_run_stats`] aggregates run/report documents with
//!   the trace-mode-aware precedence.
//! - [`config`]: [`AgentConfig`] and [`ConnectorType`], the shapes the
//!   registry resolves against.

pub mod config;
pub mod connector;
pub mod convert;
pub mod registry;
pub mod stats;
pub mod trajectory;

pub use config::{AgentConfig, ConnectorType};
pub use connector::{
    build_auth_env, build_auth_headers, Connector, ConnectorAuth, ConnectorError,
    ConnectorRequest, ContextItem, MockConnector, RestConnector, StreamingConnector,
    SubprocessConnector, TestCase,
};
pub use convert::TrajectoryConverter;
pub use registry::ConnectorRegistry;
pub use stats::{
    compute_run_stats, BenchmarkRun, EvaluationReport, MetricsStatus, PassFailStatus,
    ResultStatus, RunStats, TestCaseResult,
};
pub use trajectory::{ConnectorResponse, StepStatus, StepType, TrajectoryStep};
