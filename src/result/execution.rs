use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assertion::AssertionResult;
use crate::result::{CallChainResult, Outcome};
use crate::variable::{Dataset, Environment, Vars};

/// 一次执行的结果，子结果为 [`CallChainResult`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionResult {
    pub id: String,
    pub assertions_run: bool,
    pub environment: Environment,
    pub datasets: BTreeMap<String, Dataset>,
    pub vars: BTreeMap<String, Vars>,
    pub details: Map<String, Value>,
    pub call_chain_results: BTreeMap<String, CallChainResult>,
    pub assertion_results: Option<Vec<AssertionResult>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// 同 key 的结果保留先记录的那个
    pub fn record(&mut self, result: CallChainResult) {
        self.call_chain_results
            .entry(result.key.clone())
            .or_insert(result);
    }

    /// (调用总数, 成功调用数)
    pub fn call_counts(&self) -> (usize, usize) {
        self.call_chain_results
            .values()
            .flat_map(|chain| chain.call_results.values())
            .fold((0, 0), |(total, ok), call| {
                (total + 1, ok + usize::from(call.is_successful()))
            })
    }
}

impl Outcome for ExecutionResult {
    fn own_flag(&self) -> bool {
        true
    }

    fn assertion_results(&self) -> Option<&[AssertionResult]> {
        self.assertion_results.as_deref()
    }

    fn child_results(&self) -> BTreeMap<&str, &dyn Outcome> {
        self.call_chain_results
            .iter()
            .map(|(key, result)| (key.as_str(), result as &dyn Outcome))
            .collect()
    }

    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::CallResult;

    fn chain(key: &str, call_ok: bool) -> CallChainResult {
        let mut result = CallChainResult::new(key);
        result.succeeded = true;
        result.record(CallResult {
            executed: true,
            assertion_results: Some(vec![AssertionResult {
                succeeded: call_ok,
                ..AssertionResult::default()
            }]),
            ..CallResult::new("call")
        });
        result
    }

    #[test]
    fn test_execution_is_successful_only_when_all_chains_are() {
        let mut result = ExecutionResult::new("run");
        assert!(result.is_successful());

        result.record(chain("a", true));
        assert!(result.is_successful());

        result.record(chain("b", false));
        assert!(!result.is_successful());
        assert_eq!(result.call_counts(), (2, 1));
    }

    #[test]
    fn test_recursive_failure_through_succeeded_chain() {
        let mut result = ExecutionResult::new("run");
        let failing = chain("a", false);
        assert!(failing.is_succeeded());
        result.record(failing);

        assert!(!result.is_successful());
    }
}
