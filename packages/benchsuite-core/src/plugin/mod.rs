//! Plugin capability contracts
//!
//! Concrete providers, benchmark tools and result-storage backends live
//! outside this crate. They implement the traits below and are registered in
//! a [`PluginRegistry`] under a type reference (`<module-path>.<TypeName>`)
//! that configuration documents name in their `class` key.
//!
//! Instance behaviour is on the object-safe traits ([`Provider`],
//! [`Benchmark`], [`StorageBackend`]); construction is on the companion
//! `*Plugin` traits, whose associated functions are the factories the binder
//! calls instead of a constructor.

pub mod registry;

pub use registry::{PluginBinder, PluginCapability, PluginRecord, PluginRegistry};

use crate::config::ConfigDocument;
use crate::error::Result;
use crate::execution::{Phase, RunMode};
use crate::result::{ExecutionError, ExecutionResult, Metrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Requirements a benchmark places on the environment it runs in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRequest {
    pub requirements: BTreeMap<String, String>,
}

impl EnvironmentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }
}

/// A provisioned target a benchmark runs against.
///
/// `specs` describe the environment in result records; `properties` carry
/// whatever the provider and benchmark need to reach it (addresses, keys, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub id: String,
    specs: BTreeMap<String, String>,
    pub properties: BTreeMap<String, String>,
}

impl ExecutionEnvironment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_spec(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.specs.insert(key.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn specs(&self) -> &BTreeMap<String, String> {
        &self.specs
    }
}

/// Captured output of a benchmark run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// What a benchmark sees of the execution driving it
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub session_id: Uuid,
    pub execution_id: Uuid,
    pub environment: &'a ExecutionEnvironment,
}

/// Provisions and releases execution environments.
pub trait Provider: fmt::Debug + Send {
    fn execution_environment(&mut self, request: &EnvironmentRequest)
        -> Result<ExecutionEnvironment>;

    /// Release everything this provider provisioned.
    fn destroy_service(&mut self) -> Result<()>;

    /// Flat description of the provider, copied into result records.
    fn properties(&self) -> BTreeMap<String, String>;

    /// State needed to rebuild this instance after a restart.
    fn save_state(&self) -> Result<serde_json::Value>;
}

pub trait ProviderPlugin: Provider + Sized + 'static {
    fn load_from_config(config: &ConfigDocument, variant: &str) -> Result<Self>;

    fn restore(state: serde_json::Value) -> Result<Self>;
}

/// Extracts structured metrics from captured benchmark output.
pub trait MetricParser {
    fn parse_metrics(&self, output: &RawOutput) -> Result<Metrics>;
}

/// A runnable tool/workload pair.
pub trait Benchmark: fmt::Debug + Send {
    fn tool(&self) -> &str;

    fn workload(&self) -> &str;

    fn environment_request(&self) -> EnvironmentRequest;

    fn prepare(&mut self, ctx: &ExecutionContext<'_>) -> Result<()>;

    /// With [`RunMode::Async`] the benchmark may detach its work and return early.
    fn execute(&mut self, ctx: &ExecutionContext<'_>, mode: RunMode) -> Result<()>;

    fn result(&self, ctx: &ExecutionContext<'_>) -> Result<RawOutput>;

    /// Runtime of `phase` as measured by the benchmark itself, in seconds.
    /// `None` falls back to the timing recorded by the execution.
    fn runtime(&self, _ctx: &ExecutionContext<'_>, _phase: Phase) -> Option<f64> {
        None
    }

    fn metric_parser(&self) -> Option<&dyn MetricParser> {
        None
    }

    fn save_state(&self) -> Result<serde_json::Value>;
}

pub trait BenchmarkPlugin: Benchmark + Sized + 'static {
    fn load_from_config(config: &ConfigDocument, tool: &str, workload: &str) -> Result<Self>;

    fn restore(state: serde_json::Value) -> Result<Self>;
}

/// Result-storage backend
pub trait StorageBackend: fmt::Debug + Send {
    fn save_execution_result(&mut self, result: &ExecutionResult) -> Result<()>;

    fn save_execution_error(&mut self, error: &ExecutionError) -> Result<()>;
}

pub trait StoragePlugin: StorageBackend + Sized + 'static {
    fn load_from_config(config: &ConfigDocument, variant: Option<&str>) -> Result<Self>;
}
