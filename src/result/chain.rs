use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertionResult;
use crate::result::{CallResult, Outcome, assertions_succeeded};

/// 调用链结果，子结果为 [`CallResult`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallChainResult {
    pub key: String,
    /// 全部调用都已尝试执行
    pub succeeded: bool,
    pub call_results: BTreeMap<String, CallResult>,
    pub assertion_results: Option<Vec<AssertionResult>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl CallChainResult {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// 只看自身标志和自身断言，不递归子结果
    pub fn is_succeeded(&self) -> bool {
        self.succeeded && assertions_succeeded(self.assertion_results.as_deref())
    }

    /// 同 key 的结果保留先记录的那个
    pub fn record(&mut self, result: CallResult) {
        self.call_results.entry(result.key.clone()).or_insert(result);
    }
}

impl Outcome for CallChainResult {
    fn own_flag(&self) -> bool {
        self.succeeded
    }

    fn assertion_results(&self) -> Option<&[AssertionResult]> {
        self.assertion_results.as_deref()
    }

    fn child_results(&self) -> BTreeMap<&str, &dyn Outcome> {
        self.call_results
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

    fn assertion(succeeded: bool) -> AssertionResult {
        AssertionResult {
            id: format!("a-{}", succeeded),
            succeeded,
            ..AssertionResult::default()
        }
    }

    fn call(key: &str, succeeded: bool) -> CallResult {
        CallResult {
            executed: true,
            assertion_results: Some(vec![assertion(succeeded)]),
            ..CallResult::new(key)
        }
    }

    fn chain(calls: Vec<CallResult>, assertions: Option<Vec<AssertionResult>>) -> CallChainResult {
        let mut result = CallChainResult::new("chain");
        result.succeeded = true;
        result.assertion_results = assertions;
        for call in calls {
            result.record(call);
        }
        result
    }

    #[test]
    fn test_succeeded_and_successful_are_distinct() {
        let result = chain(
            vec![call("1", true), call("2", false)],
            Some(vec![assertion(true)]),
        );

        assert!(result.is_succeeded());
        assert!(!result.is_successful());
    }

    #[test]
    fn test_aggregation_law() {
        let all_ok = chain(vec![call("1", true), call("2", true)], Some(vec![assertion(true)]));
        assert!(all_ok.is_successful());

        let failed_own_assertion = chain(vec![call("1", true)], Some(vec![assertion(false)]));
        assert!(!failed_own_assertion.is_successful());
        assert!(!failed_own_assertion.is_succeeded());

        let empty = chain(Vec::new(), None);
        assert!(empty.is_successful());
    }

    #[test]
    fn test_own_flag_gates_both_predicates() {
        let mut result = chain(vec![call("1", true)], None);
        result.succeeded = false;

        assert!(!result.is_succeeded());
        assert!(!result.is_successful());
    }

    #[test]
    fn test_child_results_view_and_first_wins() {
        let mut result = chain(vec![call("1", true)], None);
        result.record(call("1", false));

        let children = result.child_results();
        assert_eq!(children.len(), 1);
        assert!(children["1"].is_successful());
        assert!(CallChainResult::default().child_results().is_empty());
    }
}
