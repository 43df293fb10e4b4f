use serde::{Deserialize, Serialize};

/// 断言：对完成的请求/响应求值的布尔表达式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Assertion {
    pub id: String,
    pub description: Option<String>,
    pub boolean_expression: String,
    /// 只在断言失败时求值，用于生成可读的失败信息
    pub message_template: Option<String>,
}

impl Assertion {
    pub fn new(id: impl Into<String>, boolean_expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            boolean_expression: boolean_expression.into(),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message_template: impl Into<String>) -> Self {
        self.message_template = Some(message_template.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 断言结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssertionResult {
    pub id: String,

    /// 原始断言表达式
    pub expression: String,

    /// 是否通过
    pub succeeded: bool,

    /// 求值本身出错（而不是结果为假）
    pub error: bool,

    /// 失败消息
    pub expectation_message: Option<String>,

    pub error_message: Option<String>,

    pub stack_trace: Option<String>,
}

impl AssertionResult {
    /// 创建成功的断言结果
    pub fn success(assertion: &Assertion) -> Self {
        Self {
            id: assertion.id.clone(),
            expression: assertion.boolean_expression.clone(),
            succeeded: true,
            ..Self::default()
        }
    }

    /// 创建失败的断言结果
    pub fn failure(assertion: &Assertion, expectation_message: Option<String>) -> Self {
        Self {
            id: assertion.id.clone(),
            expression: assertion.boolean_expression.clone(),
            succeeded: false,
            expectation_message,
            ..Self::default()
        }
    }

    /// 创建错误的断言结果（求值出错）
    pub fn error(assertion: &Assertion, message: String, stack_trace: String) -> Self {
        Self {
            id: assertion.id.clone(),
            expression: assertion.boolean_expression.clone(),
            succeeded: false,
            error: true,
            expectation_message: Some(format!("[Execution error: {}]", message)),
            error_message: Some(message),
            stack_trace: Some(stack_trace),
        }
    }
}
