/// 断言模块 - 对请求/响应求值断言表达式
mod evaluator;
mod types;

pub use evaluator::{evaluate_assertion, evaluate_assertions, is_true};
pub use types::{Assertion, AssertionResult};
