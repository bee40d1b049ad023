//! Execution lifecycle
//!
//! State machine:
//! CREATED → PREPARED (environment obtained, benchmark prepared)
//! PREPARED → EXECUTED (run phase completed, timing captured)
//! EXECUTED → COLLECTED (raw output materialized)
//!
//! `prepare` may be invoked again from any state; it re-requests the
//! environment and re-runs the benchmark's prepare hook.

use crate::error::{BenchsuiteError, Result};
use crate::plugin::registry::Bound;
use crate::plugin::{
    Benchmark, ExecutionContext, ExecutionEnvironment, PluginRecord, PluginRegistry, Provider,
    RawOutput,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle phase, as recorded in captured errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Prepare,
    Execute,
    Collect,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Collect => "collect",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Passed through to the benchmark; the core never awaits detached work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    Sync,
    Async,
}

impl RunMode {
    pub fn is_async(&self) -> bool {
        matches!(self, RunMode::Async)
    }
}

/// Timing of one prepare or execute call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub started: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Created,
    Prepared,
    Executed,
    Collected,
}

impl ExecutionState {
    pub fn state_name(&self) -> &'static str {
        match self {
            ExecutionState::Created => "created",
            ExecutionState::Prepared => "prepared",
            ExecutionState::Executed => "executed",
            ExecutionState::Collected => "collected",
        }
    }
}

/// Persisted form of an [`Execution`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub benchmark: PluginRecord,
    pub environment: Option<ExecutionEnvironment>,
    pub state: ExecutionState,
    pub last_prepare: Option<CommandInfo>,
    pub last_run: Option<CommandInfo>,
}

/// One run of a benchmark workload inside a session
#[derive(Debug)]
pub struct Execution {
    pub id: Uuid,
    pub session_id: Uuid,
    pub created: DateTime<Utc>,
    benchmark: Bound<dyn Benchmark>,
    environment: Option<ExecutionEnvironment>,
    state: ExecutionState,
    last_prepare: Option<CommandInfo>,
    last_run: Option<CommandInfo>,
}

impl Execution {
    pub fn new(session_id: Uuid, benchmark: Bound<dyn Benchmark>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            created: Utc::now(),
            benchmark,
            environment: None,
            state: ExecutionState::Created,
            last_prepare: None,
            last_run: None,
        }
    }

    pub fn benchmark(&self) -> &dyn Benchmark {
        self.benchmark.instance.as_ref()
    }

    pub fn benchmark_type_ref(&self) -> &str {
        &self.benchmark.type_ref
    }

    pub fn tool(&self) -> &str {
        self.benchmark.instance.tool()
    }

    pub fn workload(&self) -> &str {
        self.benchmark.instance.workload()
    }

    pub fn environment(&self) -> Option<&ExecutionEnvironment> {
        self.environment.as_ref()
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn last_prepare(&self) -> Option<&CommandInfo> {
        self.last_prepare.as_ref()
    }

    pub fn last_run(&self) -> Option<&CommandInfo> {
        self.last_run.as_ref()
    }

    /// Context handed to the benchmark. Fails until an environment has been obtained.
    pub fn context(&self) -> Result<ExecutionContext<'_>> {
        let environment = self.environment.as_ref().ok_or_else(|| {
            BenchsuiteError::InvalidStateTransition {
                from: self.state.state_name().to_string(),
                to: "running without an environment".to_string(),
            }
        })?;
        Ok(ExecutionContext {
            session_id: self.session_id,
            execution_id: self.id,
            environment,
        })
    }

    /// Obtain an environment from `provider` and run the benchmark's prepare phase.
    pub fn prepare(&mut self, provider: &mut dyn Provider) -> Result<CommandInfo> {
        let request = self.benchmark.instance.environment_request();
        let environment = provider.execution_environment(&request)?;
        debug!(
            execution_id = %self.id,
            environment = %environment.id,
            "Execution environment obtained"
        );
        let environment = self.environment.insert(environment);
        let ctx = ExecutionContext {
            session_id: self.session_id,
            execution_id: self.id,
            environment,
        };

        let started = Utc::now();
        let clock = Instant::now();
        if let Err(err) = self.benchmark.instance.prepare(&ctx) {
            self.state = ExecutionState::Created;
            return Err(err);
        }

        let info = CommandInfo {
            started,
            duration: clock.elapsed().as_secs_f64(),
        };
        self.last_prepare = Some(info.clone());
        self.state = ExecutionState::Prepared;
        Ok(info)
    }

    /// Run the benchmark. Requires a completed prepare phase.
    pub fn execute(&mut self, mode: RunMode) -> Result<CommandInfo> {
        let environment = match (self.state, self.environment.as_ref()) {
            (
                ExecutionState::Prepared | ExecutionState::Executed | ExecutionState::Collected,
                Some(environment),
            ) => environment,
            (state, _) => {
                return Err(BenchsuiteError::InvalidStateTransition {
                    from: state.state_name().to_string(),
                    to: ExecutionState::Executed.state_name().to_string(),
                })
            }
        };
        let ctx = ExecutionContext {
            session_id: self.session_id,
            execution_id: self.id,
            environment,
        };

        let started = Utc::now();
        let clock = Instant::now();
        self.benchmark.instance.execute(&ctx, mode)?;

        let info = CommandInfo {
            started,
            duration: clock.elapsed().as_secs_f64(),
        };
        self.last_run = Some(info.clone());
        self.state = ExecutionState::Executed;
        Ok(info)
    }

    /// Fetch the raw output of the last run.
    pub fn collect(&mut self) -> Result<RawOutput> {
        match self.state {
            ExecutionState::Executed | ExecutionState::Collected => {}
            other => {
                return Err(BenchsuiteError::InvalidStateTransition {
                    from: other.state_name().to_string(),
                    to: ExecutionState::Collected.state_name().to_string(),
                })
            }
        }
        let output = {
            let ctx = self.context()?;
            self.benchmark.instance.result(&ctx)?
        };
        self.state = ExecutionState::Collected;
        Ok(output)
    }

    pub fn to_record(&self) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord {
            id: self.id,
            created: self.created,
            benchmark: self.benchmark.record()?,
            environment: self.environment.clone(),
            state: self.state,
            last_prepare: self.last_prepare.clone(),
            last_run: self.last_run.clone(),
        })
    }

    pub fn from_record(
        session_id: Uuid,
        record: ExecutionRecord,
        registry: &PluginRegistry,
    ) -> Result<Self> {
        let instance = registry.restore_benchmark(&record.benchmark)?;
        Ok(Self {
            id: record.id,
            session_id,
            created: record.created,
            benchmark: Bound {
                type_ref: record.benchmark.type_ref,
                instance,
            },
            environment: record.environment,
            state: record.state,
            last_prepare: record.last_prepare,
            last_run: record.last_run,
        })
    }
}

impl std::fmt::Display for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Execution {} [{}] {}/{}",
            self.id,
            self.state.state_name(),
            self.tool(),
            self.workload()
        )?;
        if let Some(env) = &self.environment {
            write!(f, " on {}", env.id)?;
        }
        Ok(())
    }
}
