use thiserror::Error;

use crate::expression::ResolveError;

#[derive(Error, Debug)]
pub enum RuchainError {
    /// 模板解析失败，只影响当前这一个请求
    #[error("模板解析失败 ({field}): {source}")]
    TemplateResolution {
        field: String,
        #[source]
        source: ResolveError,
    },

    #[error("表达式错误: {0}")]
    Expression(#[from] ResolveError),

    /// 初始化/配置错误（缺少解析器、缺少传输层等），需要立即失败
    #[error("配置错误: {0}")]
    Config(String),

    #[error("内容读取失败: {0}")]
    Content(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML 解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("执行任务中断: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl RuchainError {
    pub fn template(field: impl Into<String>, source: ResolveError) -> Self {
        RuchainError::TemplateResolution {
            field: field.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        RuchainError::Config(message.into())
    }

    /// 是否为需要立即中止的配置类错误
    pub fn is_config(&self) -> bool {
        matches!(self, RuchainError::Config(_))
    }
}

impl From<anyhow::Error> for RuchainError {
    fn from(err: anyhow::Error) -> Self {
        RuchainError::Other(err.to_string())
    }
}

/// Result type for ruchain crate
pub type Result<T> = std::result::Result<T, RuchainError>;

/// 把错误及其 source 链格式化为多行文本，用作断言错误的 "stack trace"
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        lines.push(format!("  caused by: {}", source));
        current = source.source();
    }
    lines.join("\n")
}
