//! Benchmarking session: a bound provider plus the executions run against it
//!
//! State machine:
//! BOUND → ACTIVE (first execution requests an environment)
//! BOUND/ACTIVE → DESTROYED (provider teardown, terminal)

use crate::error::{BenchsuiteError, Result};
use crate::execution::{CommandInfo, Execution, ExecutionRecord, RunMode};
use crate::plugin::registry::Bound;
use crate::plugin::{Benchmark, PluginRecord, PluginRegistry, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Bound,
    Active,
    Destroyed,
}

impl SessionState {
    pub fn state_name(&self) -> &'static str {
        match self {
            SessionState::Bound => "bound",
            SessionState::Active => "active",
            SessionState::Destroyed => "destroyed",
        }
    }
}

/// Persisted form of a [`Session`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub state: SessionState,
    pub provider: PluginRecord,
    pub properties: BTreeMap<String, String>,
    pub executions: Vec<ExecutionRecord>,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    state: SessionState,
    provider: Bound<dyn Provider>,
    executions: HashMap<Uuid, Execution>,
    properties: BTreeMap<String, String>,
}

impl Session {
    pub fn new(provider: Bound<dyn Provider>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created: Utc::now(),
            state: SessionState::Bound,
            provider,
            executions: HashMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.instance.as_ref()
    }

    pub fn provider_type_ref(&self) -> &str {
        &self.provider.type_ref
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Free-form annotation copied into every result captured from this session.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn new_execution(&mut self, benchmark: Bound<dyn Benchmark>) -> Result<&mut Execution> {
        self.ensure_alive("new_execution")?;
        let execution = Execution::new(self.id, benchmark);
        debug!(session_id = %self.id, execution_id = %execution.id, "Execution created");
        Ok(self.executions.entry(execution.id).or_insert(execution))
    }

    pub fn list_executions(&self) -> impl Iterator<Item = &Execution> {
        self.executions.values()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    pub fn get_execution(&self, exec_id: Uuid) -> Result<&Execution> {
        self.executions
            .get(&exec_id)
            .ok_or(BenchsuiteError::UndefinedExecution(exec_id))
    }

    pub fn get_execution_mut(&mut self, exec_id: Uuid) -> Result<&mut Execution> {
        self.executions
            .get_mut(&exec_id)
            .ok_or(BenchsuiteError::UndefinedExecution(exec_id))
    }

    /// Request an environment for the execution and run its prepare phase.
    pub fn prepare_execution(&mut self, exec_id: Uuid) -> Result<CommandInfo> {
        self.ensure_alive("prepare")?;
        let execution = self
            .executions
            .get_mut(&exec_id)
            .ok_or(BenchsuiteError::UndefinedExecution(exec_id))?;
        self.state = SessionState::Active;
        execution.prepare(self.provider.instance.as_mut())
    }

    pub fn run_execution(&mut self, exec_id: Uuid, mode: RunMode) -> Result<CommandInfo> {
        self.ensure_alive("execute")?;
        self.get_execution_mut(exec_id)?.execute(mode)
    }

    /// Release the provider's resources. Terminal.
    pub fn destroy(&mut self) -> Result<()> {
        self.ensure_alive("destroyed")?;
        self.provider.instance.destroy_service()?;
        self.state = SessionState::Destroyed;
        info!(session_id = %self.id, "Session destroyed");
        Ok(())
    }

    fn ensure_alive(&self, to: &str) -> Result<()> {
        if self.state == SessionState::Destroyed {
            return Err(BenchsuiteError::InvalidStateTransition {
                from: self.state.state_name().to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    pub fn to_record(&self) -> Result<SessionRecord> {
        let mut executions = self
            .executions
            .values()
            .map(Execution::to_record)
            .collect::<Result<Vec<_>>>()?;
        executions.sort_by_key(|e| e.created);

        Ok(SessionRecord {
            id: self.id,
            created: self.created,
            state: self.state,
            provider: self.provider.record()?,
            properties: self.properties.clone(),
            executions,
        })
    }

    pub fn from_record(record: SessionRecord, registry: &PluginRegistry) -> Result<Self> {
        let instance = registry.restore_provider(&record.provider)?;
        let executions = record
            .executions
            .into_iter()
            .map(|e| Execution::from_record(record.id, e, registry).map(|e| (e.id, e)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            id: record.id,
            created: record.created,
            state: record.state,
            provider: Bound {
                type_ref: record.provider.type_ref,
                instance,
            },
            executions,
            properties: record.properties,
        })
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Session {} [{}] provider={} executions={}",
            self.id,
            self.state.state_name(),
            self.provider.type_ref,
            self.executions.len()
        )
    }
}
