//! Mock plugins and fixtures shared by the integration tests
#![allow(dead_code)]

use benchsuite_core::{
    Benchmark, BenchmarkPlugin, BenchsuiteError, CommandFailure, ConfigDocument, Controller,
    ControllerSettings, EnvironmentRequest, ExecutionContext, ExecutionEnvironment,
    ExecutionError, ExecutionResult, Metric, MetricParser, Metrics, PluginRegistry, Provider,
    ProviderPlugin, RawOutput, Result, RunMode, StorageBackend, StoragePlugin,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;
use uuid::Uuid;

pub const PROVIDER_TYPE: &str = "mock.cloud.MockProvider";
pub const BENCHMARK_TYPE: &str = "mock.bench.MockBenchmark";
pub const STORAGE_TYPE: &str = "mock.storage.RecordingStorage";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Destroy calls per provider tag, shared across restored instances
fn destroyed() -> &'static Mutex<HashMap<String, u32>> {
    static DESTROYED: OnceLock<Mutex<HashMap<String, u32>>> = OnceLock::new();
    DESTROYED.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn destroy_count(tag: &str) -> u32 {
    destroyed()
        .lock()
        .unwrap()
        .get(tag)
        .copied()
        .unwrap_or(0)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MockProvider {
    pub tag: String,
    pub service_type: String,
    pub vcpus: String,
    pub environments: u32,
}

impl Provider for MockProvider {
    fn execution_environment(&mut self, _: &EnvironmentRequest) -> Result<ExecutionEnvironment> {
        self.environments += 1;
        Ok(
            ExecutionEnvironment::new(format!("{}-vm-{}", self.service_type, self.environments))
                .with_spec("vcpus", self.vcpus.clone())
                .with_property("ip", "192.0.2.10"),
        )
    }

    fn destroy_service(&mut self) -> Result<()> {
        *destroyed().lock().unwrap().entry(self.tag.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("id".to_string(), "mock".to_string()),
            ("service_type".to_string(), self.service_type.clone()),
        ])
    }

    fn save_state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl ProviderPlugin for MockProvider {
    fn load_from_config(config: &ConfigDocument, variant: &str) -> Result<Self> {
        Ok(Self {
            tag: config.require(variant, "tag")?.to_string(),
            service_type: variant.to_string(),
            vcpus: config.get(variant, "vcpus").unwrap_or("1").to_string(),
            environments: 0,
        })
    }

    fn restore(state: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(state)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpsParser {
    pub broken: bool,
}

impl MetricParser for OpsParser {
    fn parse_metrics(&self, output: &RawOutput) -> Result<Metrics> {
        if self.broken {
            return Err(BenchsuiteError::parse("unrecognised filebench summary"));
        }
        let ops = output
            .stdout
            .split_whitespace()
            .find_map(|w| w.parse::<f64>().ok())
            .ok_or_else(|| BenchsuiteError::parse("no ops/s figure"))?;
        Ok(Metrics::from([(
            "ops".to_string(),
            Metric::with_unit(ops, "ops/s"),
        )]))
    }
}

/// Benchmark whose behaviour is driven by its workload section
/// (`fail_on`, `stdout`, `runtime`, `parser`). Remembers the last run mode.
#[derive(Debug, Serialize, Deserialize)]
pub struct MockBenchmark {
    pub tool: String,
    pub workload: String,
    pub fail_on: Option<String>,
    pub stdout: String,
    pub runtime: Option<f64>,
    pub parser: Option<OpsParser>,
    pub last_mode: Option<RunMode>,
}

impl MockBenchmark {
    fn fail_if(&self, phase: &str) -> Result<()> {
        match self.fail_on.as_deref() {
            Some("command") if phase == "execute" => Err(BenchsuiteError::CommandFailed(
                CommandFailure::new(
                    format!("filebench -f {}.f", self.workload),
                    139,
                    "Filebench Version 1.4.9.1",
                    "Segmentation fault",
                ),
            )),
            Some(p) if p == phase => {
                Err(anyhow::anyhow!("{} script exited abnormally", phase).into())
            }
            _ => Ok(()),
        }
    }
}

impl Benchmark for MockBenchmark {
    fn tool(&self) -> &str {
        &self.tool
    }

    fn workload(&self) -> &str {
        &self.workload
    }

    fn environment_request(&self) -> EnvironmentRequest {
        EnvironmentRequest::new().require("tool", self.tool.clone())
    }

    fn prepare(&mut self, _: &ExecutionContext<'_>) -> Result<()> {
        self.fail_if("prepare")
    }

    fn execute(&mut self, _: &ExecutionContext<'_>, mode: RunMode) -> Result<()> {
        self.last_mode = Some(mode);
        self.fail_if("execute")
    }

    fn result(&self, _: &ExecutionContext<'_>) -> Result<RawOutput> {
        self.fail_if("collect")?;
        Ok(RawOutput::new(self.stdout.clone(), ""))
    }

    fn runtime(&self, _: &ExecutionContext<'_>, phase: benchsuite_core::Phase) -> Option<f64> {
        match phase {
            benchsuite_core::Phase::Execute => self.runtime,
            _ => None,
        }
    }

    fn metric_parser(&self) -> Option<&dyn MetricParser> {
        self.parser.as_ref().map(|p| p as &dyn MetricParser)
    }

    fn save_state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl BenchmarkPlugin for MockBenchmark {
    fn load_from_config(config: &ConfigDocument, tool: &str, workload: &str) -> Result<Self> {
        let runtime = config
            .get(workload, "runtime")
            .map(str::parse::<f64>)
            .transpose()
            .map_err(BenchsuiteError::parse)?;
        let parser = match config.get(workload, "parser") {
            Some("ok") => Some(OpsParser { broken: false }),
            Some("broken") => Some(OpsParser { broken: true }),
            _ => None,
        };
        Ok(Self {
            tool: tool.to_string(),
            workload: workload.to_string(),
            fail_on: config.get(workload, "fail_on").map(str::to_string),
            stdout: config.get(workload, "stdout").unwrap_or("").to_string(),
            runtime,
            parser,
            last_mode: None,
        })
    }

    fn restore(state: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(state)?)
    }
}

/// Storage backend keeping everything in shared vectors; clones share them.
#[derive(Debug, Clone, Default)]
pub struct RecordingStorage {
    pub results: Arc<Mutex<Vec<ExecutionResult>>>,
    pub errors: Arc<Mutex<Vec<ExecutionError>>>,
}

impl RecordingStorage {
    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ExecutionError> {
        self.errors.lock().unwrap().clone()
    }
}

impl StorageBackend for RecordingStorage {
    fn save_execution_result(&mut self, result: &ExecutionResult) -> Result<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    fn save_execution_error(&mut self, error: &ExecutionError) -> Result<()> {
        self.errors.lock().unwrap().push(error.clone());
        Ok(())
    }
}

impl StoragePlugin for RecordingStorage {
    fn load_from_config(_: &ConfigDocument, _: Option<&str>) -> Result<Self> {
        Ok(Self::default())
    }
}

pub fn registry() -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register_provider::<MockProvider>(PROVIDER_TYPE);
    registry.register_benchmark::<MockBenchmark>(BENCHMARK_TYPE);
    registry.register_storage::<RecordingStorage>(STORAGE_TYPE);
    Arc::new(registry)
}

pub fn write_config(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub const FILEBENCH_CONF: &str = "\
[DEFAULT]
class = mock.bench.MockBenchmark
parser = ok
stdout = IO Summary: 1234.5 ops/s

[varmail_short]
runtime = 12.5

[fileserver]
parser = broken

[broken_prepare]
fail_on = prepare

[broken_command]
fail_on = command
";

/// Temporary configuration and data directories with a `filab` provider
/// (single `small` service type) and a `filebench` benchmark.
pub struct Fixture {
    pub config_dir: TempDir,
    pub data_dir: TempDir,
    pub tag: String,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let fixture = Self {
            config_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
            tag: Uuid::new_v4().to_string(),
        };
        write_config(
            fixture.config_dir.path(),
            "providers/filab.conf",
            &format!(
                "[DEFAULT]\ntag = {}\n\n[provider]\nclass = {}\n\n[small]\nvcpus = 2\n",
                fixture.tag, PROVIDER_TYPE
            ),
        );
        write_config(
            fixture.config_dir.path(),
            "benchmarks/filebench.conf",
            FILEBENCH_CONF,
        );
        fixture
    }

    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings::default()
            .with_default_config_dir(self.config_dir.path())
            .with_data_dir(self.data_dir.path())
    }

    pub fn open(&self) -> Controller {
        Controller::open(self.settings(), registry()).unwrap()
    }

    /// Controller with a recording storage backend; the returned handle shares its sinks.
    pub fn open_with_storage(&self) -> (Controller, RecordingStorage) {
        let storage = RecordingStorage::default();
        let controller = self.open().with_storage(Box::new(storage.clone()));
        (controller, storage)
    }

    pub fn destroy_count(&self) -> u32 {
        destroy_count(&self.tag)
    }
}
