//! 三层结果：调用 → 调用链 → 执行
//!
//! 三层共享同一套成功判定与耗时计算，见 [`Outcome`]。

mod call;
mod chain;
mod execution;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::assertion::AssertionResult;

pub use call::CallResult;
pub use chain::CallChainResult;
pub use execution::ExecutionResult;

/// 缺少起止时间时的耗时
pub const UNKNOWN_DURATION: i64 = -1;

/// 结果的公共能力
pub trait Outcome {
    /// 本层自身的状态标志
    fn own_flag(&self) -> bool;

    /// 本层自身的断言结果；`None` 表示断言没有执行
    fn assertion_results(&self) -> Option<&[AssertionResult]>;

    /// 子结果的只读视图，没有子结果时为空
    fn child_results(&self) -> BTreeMap<&str, &dyn Outcome>;

    fn start_date(&self) -> Option<DateTime<Utc>>;

    fn end_date(&self) -> Option<DateTime<Utc>>;

    /// 自身标志、自身断言以及全部子结果（递归）都成功
    fn is_successful(&self) -> bool {
        self.own_flag()
            && assertions_succeeded(self.assertion_results())
            && self
                .child_results()
                .values()
                .all(|child| child.is_successful())
    }

    /// 毫秒；任一时间缺失时为 -1
    fn duration(&self) -> i64 {
        duration_between(self.start_date(), self.end_date())
    }
}

/// 断言为空或全部通过
pub fn assertions_succeeded(results: Option<&[AssertionResult]>) -> bool {
    results.is_none_or(|results| results.iter().all(|r| r.succeeded))
}

pub fn duration_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).num_milliseconds(),
        _ => UNKNOWN_DURATION,
    }
}

/// 打印用的时间格式
pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}
