/*
 * Benchsuite Core - Benchmark Orchestration
 *
 * Runs benchmark workloads against provisioned cloud services and keeps
 * sessions alive across process restarts.
 *
 * Architecture:
 * - Configuration resolution (alternative/default directories, JSON or INI)
 * - Plugin registry (providers, benchmarks, result storage)
 * - Session/Execution state machines
 * - Durable session store (bincode blob)
 * - Result/error capture pipeline
 */

// Public modules
pub mod config;
pub mod controller;
pub mod error;
pub mod execution;
pub mod plugin;
pub mod result;
pub mod session;
pub mod store;

// Re-exports
pub use config::{
    ConfigDocument, ConfigKind, ConfigResolver, ConfigSection, ConfigSource, ControllerSettings,
    SourceOrigin,
};
pub use controller::{BatchEntry, BatchOutcome, BatchReport, BatchRequest, BatchTest, Controller};
pub use error::{BenchsuiteError, CommandFailure, ErrorKind, Result};
pub use execution::{CommandInfo, Execution, ExecutionState, Phase, RunMode};
pub use plugin::registry::Bound;
pub use plugin::{
    Benchmark, BenchmarkPlugin, EnvironmentRequest, ExecutionContext, ExecutionEnvironment,
    MetricParser, PluginBinder, PluginCapability, PluginRecord, PluginRegistry, Provider,
    ProviderPlugin, RawOutput, StorageBackend, StoragePlugin,
};
pub use result::{ExecutionError, ExecutionResult, Metric, Metrics};
pub use session::{Session, SessionState};
pub use store::SessionStore;
