//! Captured outcomes of an execution
//!
//! [`ExecutionResult`] is built only after a successful collect;
//! [`ExecutionError`] is built when prepare or execute fails. Both are
//! immutable snapshots handed to the configured storage backend.

use crate::error::{BenchsuiteError, CommandFailure, ErrorKind, Result};
use crate::execution::{Execution, Phase};
use crate::plugin::RawOutput;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

pub const DURATION_METRIC: &str = "duration";
pub const SECONDS: &str = "s";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub value: f64,
    pub unit: Option<String>,
}

impl Metric {
    pub fn new(value: f64) -> Self {
        Self { value, unit: None }
    }

    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
        }
    }
}

pub type Metrics = BTreeMap<String, Metric>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub session_id: Uuid,
    pub start: DateTime<Utc>,
    /// Seconds spent in the run phase
    pub duration: f64,
    pub tool: String,
    pub workload: String,
    pub provider: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
    pub stdout: String,
    pub stderr: String,
    pub metrics: Metrics,
    pub properties: BTreeMap<String, String>,
}

impl ExecutionResult {
    /// Snapshot a collected execution.
    ///
    /// The duration comes from the benchmark's own runtime report for the run
    /// phase, falling back to the timing recorded around `execute`. A failing
    /// metric parser is logged and leaves only the duration metric.
    pub fn capture(session: &Session, execution: &Execution, output: RawOutput) -> Result<Self> {
        let ctx = execution.context()?;
        let benchmark = execution.benchmark();

        let duration = benchmark
            .runtime(&ctx, Phase::Execute)
            .or_else(|| execution.last_run().map(|r| r.duration))
            .unwrap_or(0.0)
            .max(0.0);
        let start = execution
            .last_run()
            .map(|r| r.started)
            .unwrap_or_else(Utc::now);

        let mut metrics = Metrics::new();
        if let Some(parser) = benchmark.metric_parser() {
            match parser.parse_metrics(&output) {
                Ok(parsed) => metrics.extend(parsed),
                Err(e) => warn!(
                    execution_id = %execution.id,
                    tool = benchmark.tool(),
                    workload = benchmark.workload(),
                    error = %e,
                    "Metric parser failed, keeping base metrics only"
                ),
            }
        }
        metrics.insert(
            DURATION_METRIC.to_string(),
            Metric::with_unit(duration, SECONDS),
        );

        Ok(Self {
            execution_id: execution.id,
            session_id: session.id,
            start,
            duration,
            tool: benchmark.tool().to_string(),
            workload: benchmark.workload().to_string(),
            provider: session.provider().properties(),
            environment: ctx.environment.specs().clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            metrics,
            properties: session.properties().clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub timestamp: DateTime<Utc>,
    pub execution_id: Uuid,
    pub session_id: Uuid,
    pub tool: String,
    pub workload: String,
    pub provider: BTreeMap<String, String>,
    /// `None` when the failure happened before an environment was obtained
    pub environment: Option<BTreeMap<String, String>>,
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
    pub diagnostic: serde_json::Value,
    pub trace: String,
}

impl ExecutionError {
    pub fn capture(
        session: &Session,
        execution: &Execution,
        phase: Phase,
        error: &BenchsuiteError,
    ) -> Self {
        // plugin failures carry the backtrace of their origin
        let backtrace = match error {
            BenchsuiteError::Plugin(e) => e.backtrace().to_string(),
            _ => Backtrace::force_capture().to_string(),
        };
        let trace = format!("{}\n\n{}", error.chain(), backtrace);
        Self {
            timestamp: Utc::now(),
            execution_id: execution.id,
            session_id: session.id,
            tool: execution.tool().to_string(),
            workload: execution.workload().to_string(),
            provider: session.provider().properties(),
            environment: execution.environment().map(|env| env.specs().clone()),
            phase,
            kind: error.kind(),
            message: error.to_string(),
            diagnostic: error.diagnostic(),
            trace,
        }
    }
}

/// Path of the side-channel dump for a failed remote command.
pub fn command_failure_path(data_dir: &Path, execution_id: Uuid) -> PathBuf {
    data_dir.join(format!("{}.err.txt", execution_id))
}

pub fn dump_command_failure(
    data_dir: &Path,
    execution_id: Uuid,
    failure: &CommandFailure,
) -> Result<PathBuf> {
    let path = command_failure_path(data_dir, execution_id);
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, failure.dump())?;
    Ok(path)
}
