use std::collections::HashSet;

use serde_json::Value;

use crate::assertion::types::{Assertion, AssertionResult};
use crate::error::format_error_chain;
use crate::expression::Resolver;
use crate::variable::Context;

/// 求值结果是否为真：布尔 `true` 或字符串 "true"（不区分大小写）
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// 执行单个断言
///
/// 求值出错不会向外传播，而是记录为 `error = true` 的结果。
pub fn evaluate_assertion(
    assertion: &Assertion,
    resolver: &dyn Resolver,
    context: &Context,
) -> AssertionResult {
    let value = match resolver.eval(context, &assertion.boolean_expression) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(id = %assertion.id, error = %err, "Assertion evaluation failed");
            return AssertionResult::error(assertion, err.to_string(), format_error_chain(&err));
        }
    };

    if is_true(&value) {
        return AssertionResult::success(assertion);
    }

    let message = match assertion.message_template.as_deref() {
        Some(template) if !template.trim().is_empty() => match resolver.eval(context, template) {
            Ok(Value::String(message)) => Some(message),
            Ok(other) => Some(other.to_string()),
            Err(err) => {
                tracing::warn!(id = %assertion.id, error = %err, "Assertion message evaluation failed");
                return AssertionResult::error(assertion, err.to_string(), format_error_chain(&err));
            }
        },
        _ => None,
    };

    AssertionResult::failure(assertion, message)
}

/// 依次执行全部断言，一个断言失败不影响其他断言
///
/// 相同 id 只保留第一次出现的结果。
pub fn evaluate_assertions(
    assertions: &[Assertion],
    resolver: &dyn Resolver,
    context: &Context,
) -> Vec<AssertionResult> {
    let mut seen = HashSet::new();
    assertions
        .iter()
        .filter(|assertion| seen.insert(assertion.id.as_str()))
        .map(|assertion| evaluate_assertion(assertion, resolver, context))
        .collect()
}
