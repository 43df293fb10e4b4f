use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::{Assertion, AssertionResult};
use crate::http::{Request, Response};
use crate::result::Outcome;

/// 单次调用的结果（叶子）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallResult {
    /// 与 `Call.key` 相同
    pub key: String,
    /// 请求是否成功解析并派发；模板解析失败时为 false
    pub executed: bool,
    pub request: Option<Request>,
    pub response: Option<Response>,
    pub assertions_executed: bool,
    pub script_mode: bool,
    pub script: Option<String>,
    pub assertions: Vec<Assertion>,
    /// 传输层失败或未执行断言时为 `None`
    pub assertion_results: Option<Vec<AssertionResult>>,
    /// 解析/脚本错误信息
    pub error: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl CallResult {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// 请求未能解析的调用
    pub fn unresolved(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            executed: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// 传输层是否失败
    pub fn transport_failed(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.failed)
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertion_results
            .iter()
            .flatten()
            .filter(|result| !result.succeeded)
    }
}

impl Outcome for CallResult {
    fn own_flag(&self) -> bool {
        self.executed
    }

    fn assertion_results(&self) -> Option<&[AssertionResult]> {
        self.assertion_results.as_deref()
    }

    fn child_results(&self) -> BTreeMap<&str, &dyn Outcome> {
        BTreeMap::new()
    }

    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }
}
