use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chain::CallChain;
use crate::result::{ExecutionResult, Outcome};
use crate::variable::{Dataset, Environment, Session, Vars};
use crate::{Result, RuchainError};

/// 最小工作池大小
pub const MIN_POOL_SIZE: usize = 5;

/// 调度配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulingConfig {
    /// 具名传输层，`None` 使用注册表默认
    pub transport: Option<String>,
    pub parallel: bool,
    pub thread_count: usize,
    pub iterations: usize,
    pub run_assertions: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            transport: None,
            parallel: false,
            thread_count: MIN_POOL_SIZE,
            iterations: 1,
            run_assertions: true,
        }
    }
}

impl SchedulingConfig {
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    pub fn with_transport(mut self, name: impl Into<String>) -> Self {
        self.transport = Some(name.into());
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_run_assertions(mut self, run_assertions: bool) -> Self {
        self.run_assertions = run_assertions;
        self
    }

    /// 实际并发数，不小于 [`MIN_POOL_SIZE`]
    pub fn pool_size(&self) -> usize {
        self.thread_count.max(MIN_POOL_SIZE)
    }

    /// 至少执行一轮
    pub fn effective_iterations(&self) -> usize {
        self.iterations.max(1)
    }
}

/// 一次执行计划：若干调用链和它们共享的变量来源
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionSchedule {
    pub id: String,
    pub description: Option<String>,
    pub comments: Option<String>,
    pub details: Map<String, Value>,
    pub call_chains: Vec<CallChain>,
    pub environment: Environment,
    pub datasets: BTreeMap<String, Dataset>,
    pub vars: BTreeMap<String, Vars>,
}

impl Default for ExecutionSchedule {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: None,
            comments: None,
            details: Map::new(),
            call_chains: Vec::new(),
            environment: Environment::default(),
            datasets: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }
}

impl ExecutionSchedule {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    pub fn with_chain(mut self, chain: CallChain) -> Self {
        self.call_chains.push(chain);
        self
    }

    pub fn with_dataset(mut self, name: impl Into<String>, dataset: Dataset) -> Self {
        self.datasets.insert(name.into(), dataset);
        self
    }

    pub fn with_vars(mut self, name: impl Into<String>, vars: Vars) -> Self {
        self.vars.insert(name.into(), vars);
        self
    }

    /// 从 JSON 或 TOML 文件加载，按扩展名区分
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(RuchainError::config(format!(
                "不支持的计划文件格式: {}",
                path.display()
            ))),
        }
    }

    /// 本计划对应的会话（变量来源 + 调用链）
    pub fn session(&self) -> Session {
        Session {
            environment: self.environment.clone(),
            datasets: self.datasets.clone(),
            vars: self.vars.clone(),
            call_chains: self
                .call_chains
                .iter()
                .map(|chain| (chain.key.clone(), chain.clone()))
                .collect(),
        }
    }
}

/// 执行摘要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionSummary {
    pub chains: usize,
    pub passed_chains: usize,
    pub calls: usize,
    pub passed_calls: usize,
    /// 未能解析的调用
    pub unresolved_calls: usize,
    /// 传输层失败的调用
    pub transport_failures: usize,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    /// 求值出错的断言
    pub error_assertions: usize,
    /// 毫秒，未知时为 -1
    pub duration: i64,
}

impl ExecutionSummary {
    pub fn from_result(result: &ExecutionResult) -> Self {
        let chains = result.call_chain_results.values();
        let calls: Vec<_> = chains
            .clone()
            .flat_map(|chain| chain.call_results.values())
            .collect();

        // 调用级断言 + 调用链级断言
        let assertions: Vec<_> = calls
            .iter()
            .flat_map(|call| call.assertion_results.iter().flatten())
            .chain(
                result
                    .call_chain_results
                    .values()
                    .flat_map(|chain| chain.assertion_results.iter().flatten()),
            )
            .collect();

        let passed_assertions = assertions.iter().filter(|a| a.succeeded).count();

        Self {
            chains: result.call_chain_results.len(),
            passed_chains: chains.filter(|chain| chain.is_successful()).count(),
            calls: calls.len(),
            passed_calls: calls.iter().filter(|call| call.is_successful()).count(),
            unresolved_calls: calls.iter().filter(|call| !call.executed).count(),
            transport_failures: calls.iter().filter(|call| call.transport_failed()).count(),
            total_assertions: assertions.len(),
            passed_assertions,
            failed_assertions: assertions.len() - passed_assertions,
            error_assertions: assertions.iter().filter(|a| a.error).count(),
            duration: result.duration(),
        }
    }

    pub fn failed_calls(&self) -> usize {
        self.calls - self.passed_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::AssertionResult;
    use crate::http::Response;
    use crate::result::{CallChainResult, CallResult};

    #[test]
    fn test_scheduling_config_defaults() {
        let config: SchedulingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulingConfig::default());
        assert!(!config.parallel);
        assert!(config.run_assertions);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.pool_size(), 5);
    }

    #[test]
    fn test_pool_size_has_minimum() {
        assert_eq!(SchedulingConfig::default().with_thread_count(1).pool_size(), 5);
        assert_eq!(SchedulingConfig::default().with_thread_count(12).pool_size(), 12);
        assert_eq!(SchedulingConfig::default().with_iterations(0).effective_iterations(), 1);
    }

    #[test]
    fn test_schedule_gets_unique_id() {
        let a = ExecutionSchedule::default();
        let b = ExecutionSchedule::default();
        assert_ne!(a.id, b.id);

        let parsed: ExecutionSchedule = serde_json::from_str(r#"{"id": "fixed"}"#).unwrap();
        assert_eq!(parsed.id, "fixed");
    }

    #[test]
    fn test_load_schedule_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("schedule.json");
        std::fs::write(
            &json_path,
            r#"{"id": "nightly", "callChains": [{"key": "health"}], "environment": {"key": "dev"}}"#,
        )
        .unwrap();
        let schedule = ExecutionSchedule::from_path(&json_path).unwrap();
        assert_eq!(schedule.id, "nightly");
        assert_eq!(schedule.call_chains[0].key, "health");

        let toml_path = dir.path().join("schedule.toml");
        std::fs::write(
            &toml_path,
            r#"
id = "from-toml"

[environment]
key = "staging"

[environment.vars]
host = "example.com"

[[callChains]]
key = "health"
"#,
        )
        .unwrap();
        let schedule = ExecutionSchedule::from_path(&toml_path).unwrap();
        assert_eq!(schedule.id, "from-toml");
        assert_eq!(schedule.environment.vars["host"], "example.com");

        let yaml_path = dir.path().join("schedule.yaml");
        std::fs::write(&yaml_path, "id: x").unwrap();
        assert!(ExecutionSchedule::from_path(&yaml_path).unwrap_err().is_config());
    }

    #[test]
    fn test_schedule_session_contains_chains() {
        let schedule = ExecutionSchedule::new(Environment::new("dev"))
            .with_chain(CallChain::new("first"))
            .with_chain(CallChain::new("second"));

        let session = schedule.session();
        assert_eq!(session.call_chains.len(), 2);
        assert!(session.call_chains.contains_key("second"));
    }

    #[test]
    fn test_summary_counts() {
        let mut chain = CallChainResult::new("chain");
        chain.succeeded = true;
        chain.record(CallResult {
            executed: true,
            assertion_results: Some(vec![
                AssertionResult {
                    succeeded: true,
                    ..AssertionResult::default()
                },
                AssertionResult {
                    error: true,
                    ..AssertionResult::default()
                },
            ]),
            ..CallResult::new("1")
        });
        chain.record(CallResult {
            executed: true,
            response: Some(Response::failed_with_message("refused")),
            ..CallResult::new("2")
        });
        chain.record(CallResult::unresolved("3", "bad"));

        let mut result = ExecutionResult::new("run");
        result.record(chain);

        let summary = ExecutionSummary::from_result(&result);
        assert_eq!(summary.chains, 1);
        assert_eq!(summary.passed_chains, 0);
        assert_eq!(summary.calls, 3);
        assert_eq!(summary.passed_calls, 1);
        assert_eq!(summary.failed_calls(), 2);
        assert_eq!(summary.unresolved_calls, 1);
        assert_eq!(summary.transport_failures, 1);
        assert_eq!(summary.total_assertions, 2);
        assert_eq!(summary.failed_assertions, 1);
        assert_eq!(summary.error_assertions, 1);
        assert_eq!(summary.duration, -1);
    }
}
