//! Controller facade
//!
//! Composes configuration resolution, plugin binding, the session store and
//! the optional result-storage backend. Every failing prepare/execute/collect
//! is reported (log, side-channel dump, storage) before the error is returned
//! to the caller.

use crate::config::{ConfigKind, ConfigResolver, ConfigSource, ControllerSettings};
use crate::error::{BenchsuiteError, ErrorKind, Result};
use crate::execution::{CommandInfo, Execution, Phase, RunMode};
use crate::plugin::{PluginBinder, PluginRegistry, StorageBackend};
use crate::result::{dump_command_failure, ExecutionError, ExecutionResult};
use crate::session::Session;
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Logical name of the storage document in the configuration directory root
pub const STORAGE_CONFIG_NAME: &str = "storage";

/// One (tool, workload) pair of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTest {
    pub tool: String,
    pub workload: String,
}

impl BatchTest {
    pub fn new(tool: impl Into<String>, workload: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            workload: workload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub provider: String,
    pub service_type: Option<String>,
    pub tests: Vec<BatchTest>,
    /// Stop at the first failing test instead of continuing with the rest
    pub fail_fast: bool,
}

impl BatchRequest {
    pub fn new(provider: impl Into<String>, tests: Vec<BatchTest>) -> Self {
        Self {
            provider: provider.into(),
            service_type: None,
            tests,
            fail_fast: false,
        }
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Completed(Box<ExecutionResult>),
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub test: BatchTest,
    /// `None` when the execution could not even be created
    pub execution_id: Option<Uuid>,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub session_id: Uuid,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn results(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            BatchOutcome::Completed(result) => Some(result.as_ref()),
            BatchOutcome::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, BatchOutcome::Failed { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

pub struct Controller {
    settings: ControllerSettings,
    resolver: ConfigResolver,
    binder: PluginBinder,
    store: SessionStore,
    storage: Option<Box<dyn StorageBackend>>,
    closed: bool,
}

impl Controller {
    /// Open the data directory, load persisted sessions and bind the storage
    /// backend if one is configured.
    pub fn open(settings: ControllerSettings, registry: Arc<PluginRegistry>) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;
        if let Some(dir) = &settings.config_dir {
            info!(config_dir = %dir.display(), "Using custom config directory");
        }

        let resolver = ConfigResolver::new(
            settings.default_config_dir.clone(),
            settings.config_dir.clone(),
        );
        let binder = PluginBinder::new(Arc::clone(&registry));
        let mut store = SessionStore::new(&settings.data_dir, registry);
        store.load()?;

        let storage = Self::bind_storage(&settings, &resolver, &binder)?;

        info!(
            data_dir = %settings.data_dir.display(),
            sessions = store.len(),
            storage = storage.is_some(),
            "Controller opened"
        );

        Ok(Self {
            settings,
            resolver,
            binder,
            store,
            storage,
            closed: false,
        })
    }

    fn bind_storage(
        settings: &ControllerSettings,
        resolver: &ConfigResolver,
        binder: &PluginBinder,
    ) -> Result<Option<Box<dyn StorageBackend>>> {
        let source = match &settings.storage_config {
            Some(value) => resolver.resolve_path_or_str(ConfigKind::Storage, value)?,
            None => match resolver.locate(ConfigKind::Storage, STORAGE_CONFIG_NAME) {
                Ok(_) => resolver.resolve(ConfigKind::Storage, STORAGE_CONFIG_NAME)?,
                Err(_) => {
                    debug!("No storage configuration found");
                    return Ok(None);
                }
            },
        };
        let bound = binder.bind_storage(&source, None)?;
        info!(type_ref = %bound.type_ref, "Storage backend bound");
        Ok(Some(bound.instance))
    }

    /// Replace the configured storage backend.
    pub fn with_storage(mut self, storage: Box<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Flush the session store and consume the controller.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.store.store()
    }

    // ----- discovery -----

    pub fn list_available_providers(&self) -> Result<Vec<ConfigSource>> {
        self.resolver.list_all(ConfigKind::Provider)
    }

    pub fn list_available_benchmarks(&self) -> Result<Vec<ConfigSource>> {
        self.resolver.list_all(ConfigKind::Benchmark)
    }

    pub fn list_available_storage(&self) -> Result<Vec<ConfigSource>> {
        self.resolver.list_all(ConfigKind::Storage)
    }

    // ----- sessions -----

    pub fn list_sessions(&self) -> impl Iterator<Item = &Session> {
        self.store.list()
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<&Session> {
        self.store.get(session_id)
    }

    pub fn get_session_mut(&mut self, session_id: Uuid) -> Result<&mut Session> {
        self.store.get_mut(session_id)
    }

    /// Bind the named provider and open a session on it. Without an explicit
    /// service type the configured default is used.
    pub fn new_session(&mut self, provider: &str, service_type: Option<&str>) -> Result<Uuid> {
        let source = self.resolver.resolve(ConfigKind::Provider, provider)?;
        self.open_session(&source, service_type)
    }

    pub fn new_session_by_config_string(
        &mut self,
        config: &str,
        service_type: Option<&str>,
    ) -> Result<Uuid> {
        let source = self.resolver.resolve_str(ConfigKind::Provider, config)?;
        self.open_session(&source, service_type)
    }

    /// Open a session from the inline provider document in the settings.
    pub fn new_session_from_env(&mut self) -> Result<Uuid> {
        let config = self.settings.provider_config.clone().ok_or_else(|| {
            BenchsuiteError::configuration(
                ConfigKind::Provider,
                "<inline>",
                "no inline provider configuration set",
            )
        })?;
        self.new_session_by_config_string(&config, None)
    }

    fn open_session(&mut self, source: &ConfigSource, service_type: Option<&str>) -> Result<Uuid> {
        let service_type = service_type.or(self.settings.service_type.as_deref());
        let provider = self.binder.bind_provider(source, service_type)?;
        let session = self.store.add(Session::new(provider));
        info!(
            session_id = %session.id,
            provider = %source.name,
            type_ref = %session.provider_type_ref(),
            "Session created"
        );
        Ok(session.id)
    }

    /// Tear down the provider's resources and forget the session.
    pub fn destroy_session(&mut self, session_id: Uuid) -> Result<()> {
        let session = self.store.get_mut(session_id)?;
        debug!(session = %session, "Destroying session");
        session.destroy()?;
        self.store.remove(session_id)?;
        Ok(())
    }

    // ----- executions -----

    /// Executions across every session.
    pub fn list_executions(&self) -> Vec<&Execution> {
        self.store
            .list()
            .flat_map(|s| s.list_executions())
            .collect()
    }

    /// Look an execution up in `session_id`, or in every session when unpinned.
    pub fn get_execution(&self, exec_id: Uuid, session_id: Option<Uuid>) -> Result<&Execution> {
        let session_id = self.owning_session(exec_id, session_id)?;
        self.store.get(session_id)?.get_execution(exec_id)
    }

    fn owning_session(&self, exec_id: Uuid, session_id: Option<Uuid>) -> Result<Uuid> {
        if let Some(session_id) = session_id {
            self.store.get(session_id)?.get_execution(exec_id)?;
            return Ok(session_id);
        }
        self.store
            .list()
            .find(|s| s.get_execution(exec_id).is_ok())
            .map(|s| s.id)
            .ok_or(BenchsuiteError::UndefinedExecution(exec_id))
    }

    pub fn new_execution(&mut self, session_id: Uuid, tool: &str, workload: &str) -> Result<Uuid> {
        let session = self.store.get(session_id)?;
        debug!(session = %session, tool, workload, "Creating execution");

        let source = self.resolver.resolve(ConfigKind::Benchmark, tool)?;
        let benchmark = self.binder.bind_benchmark(&source, Some(workload))?;
        let execution = self.store.get_mut(session_id)?.new_execution(benchmark)?;
        info!(
            session_id = %session_id,
            execution_id = %execution.id,
            tool = execution.tool(),
            workload = execution.workload(),
            "Execution created"
        );
        Ok(execution.id)
    }

    pub fn prepare_execution(
        &mut self,
        exec_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<CommandInfo> {
        let session_id = self.owning_session(exec_id, session_id)?;
        let outcome = self.store.get_mut(session_id)?.prepare_execution(exec_id);
        self.capture_failure(session_id, exec_id, Phase::Prepare, outcome)
    }

    pub fn run_execution(
        &mut self,
        exec_id: Uuid,
        mode: RunMode,
        session_id: Option<Uuid>,
    ) -> Result<CommandInfo> {
        let session_id = self.owning_session(exec_id, session_id)?;
        let outcome = self
            .store
            .get_mut(session_id)?
            .run_execution(exec_id, mode);
        self.capture_failure(session_id, exec_id, Phase::Execute, outcome)
    }

    /// Collect the raw output, build the result record and hand it to storage.
    pub fn collect_execution_results(
        &mut self,
        exec_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<ExecutionResult> {
        let session_id = self.owning_session(exec_id, session_id)?;
        let outcome = self.collect(session_id, exec_id);
        let result = self.capture_failure(session_id, exec_id, Phase::Collect, outcome)?;
        self.save_result(&result);
        Ok(result)
    }

    fn collect(&mut self, session_id: Uuid, exec_id: Uuid) -> Result<ExecutionResult> {
        let output = self
            .store
            .get_mut(session_id)?
            .get_execution_mut(exec_id)?
            .collect()?;
        let session = self.store.get(session_id)?;
        ExecutionResult::capture(session, session.get_execution(exec_id)?, output)
    }

    fn save_result(&mut self, result: &ExecutionResult) {
        let Some(storage) = self.storage.as_mut() else {
            debug!(execution_id = %result.execution_id, "No storage configured, result not persisted");
            return;
        };
        if let Err(e) = storage.save_execution_result(result) {
            warn!(
                execution_id = %result.execution_id,
                error = %e,
                "Failed to persist execution result"
            );
        }
    }

    /// Report a failed phase, then hand the outcome back unchanged.
    /// Out-of-order calls are caller errors and are only logged.
    fn capture_failure<T>(
        &mut self,
        session_id: Uuid,
        exec_id: Uuid,
        phase: Phase,
        outcome: Result<T>,
    ) -> Result<T> {
        match &outcome {
            Err(err) if err.kind() == ErrorKind::InvalidState => debug!(
                execution_id = %exec_id,
                phase = %phase,
                error = %err,
                "Phase called out of order, not captured"
            ),
            Err(err) => self.report_failure(session_id, exec_id, phase, err),
            Ok(_) => {}
        }
        outcome
    }

    fn report_failure(&mut self, session_id: Uuid, exec_id: Uuid, phase: Phase, err: &BenchsuiteError) {
        let Ok(session) = self.store.get(session_id) else {
            return;
        };
        let Ok(execution) = session.get_execution(exec_id) else {
            return;
        };

        error!(
            session_id = %session_id,
            execution_id = %exec_id,
            tool = execution.tool(),
            workload = execution.workload(),
            phase = %phase,
            kind = %err.kind(),
            error = %err,
            "Execution failed"
        );

        if let BenchsuiteError::CommandFailed(failure) = err {
            match dump_command_failure(&self.settings.data_dir, exec_id, failure) {
                Ok(path) => info!(path = %path.display(), "Failed command output dumped"),
                Err(e) => warn!(error = %e, "Cannot dump failed command output"),
            }
        }

        let record = ExecutionError::capture(session, execution, phase, err);
        match self.storage.as_mut() {
            Some(storage) => {
                if let Err(e) = storage.save_execution_error(&record) {
                    warn!(execution_id = %exec_id, error = %e, "Failed to persist execution error");
                }
            }
            None => warn!(
                execution_id = %exec_id,
                "No storage configured, error persistence disabled"
            ),
        }
    }

    // ----- drivers -----

    /// Create a session, run one test end to end and destroy the session.
    pub fn execute_onestep(
        &mut self,
        provider: &str,
        service_type: Option<&str>,
        tool: &str,
        workload: &str,
    ) -> Result<ExecutionResult> {
        let session_id = self.new_session(provider, service_type)?;
        let outcome = self
            .run_test(session_id, tool, workload)
            .map(|(_, result)| result)
            .map_err(|(_, e)| e);
        match outcome {
            Ok(result) => {
                self.destroy_session(session_id)?;
                Ok(result)
            }
            Err(e) => Err(self.abandon_session(session_id, e)),
        }
    }

    /// Run every (tool, workload) pair against one session.
    ///
    /// A failing test is recorded and the batch moves on, unless
    /// `fail_fast` is set. The session is destroyed exactly once at the end
    /// either way.
    pub fn run_batch(&mut self, request: &BatchRequest) -> Result<BatchReport> {
        let session_id = self.new_session(&request.provider, request.service_type.as_deref())?;
        let mut entries = Vec::with_capacity(request.tests.len());

        for test in &request.tests {
            let entry = match self.run_test(session_id, &test.tool, &test.workload) {
                Ok((exec_id, result)) => BatchEntry {
                    test: test.clone(),
                    execution_id: Some(exec_id),
                    outcome: BatchOutcome::Completed(Box::new(result)),
                },
                Err((_, e)) if request.fail_fast => {
                    return Err(self.abandon_session(session_id, e));
                }
                Err((exec_id, e)) => {
                    warn!(
                        tool = %test.tool,
                        workload = %test.workload,
                        error = %e,
                        "Test failed, continuing with the batch"
                    );
                    BatchEntry {
                        test: test.clone(),
                        execution_id: exec_id,
                        outcome: BatchOutcome::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    }
                }
            };
            entries.push(entry);
        }

        self.destroy_session(session_id)?;
        let report = BatchReport {
            session_id,
            entries,
        };
        info!(
            session_id = %session_id,
            tests = report.entries.len(),
            failures = report.failures(),
            "Batch finished"
        );
        Ok(report)
    }

    fn run_test(
        &mut self,
        session_id: Uuid,
        tool: &str,
        workload: &str,
    ) -> std::result::Result<(Uuid, ExecutionResult), (Option<Uuid>, BenchsuiteError)> {
        let exec_id = self
            .new_execution(session_id, tool, workload)
            .map_err(|e| (None, e))?;
        let run = |this: &mut Self| -> Result<ExecutionResult> {
            this.prepare_execution(exec_id, Some(session_id))?;
            this.run_execution(exec_id, RunMode::Sync, Some(session_id))?;
            this.collect_execution_results(exec_id, Some(session_id))
        };
        run(self)
            .map(|result| (exec_id, result))
            .map_err(|e| (Some(exec_id), e))
    }

    /// Destroy the session after a failed run; the run's error is what surfaces.
    fn abandon_session(&mut self, session_id: Uuid, err: BenchsuiteError) -> BenchsuiteError {
        if let Err(destroy_err) = self.destroy_session(session_id) {
            error!(session_id = %session_id, error = %destroy_err, "Cannot destroy session");
        }
        err
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.store.store() {
            error!(path = %self.store.path().display(), error = %e, "Failed to store sessions");
        }
    }
}
