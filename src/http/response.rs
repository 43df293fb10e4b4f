use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::body::Body;

/// 响应
///
/// 网络/协议层失败不会作为错误抛出，而是以 `failed = true` 的响应表示。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    /// 失败时为 0
    pub status: u16,
    pub status_reason: Option<String>,
    pub length: Option<u64>,
    pub body: Option<Body>,
    /// 最终 URI（跟随重定向之后）
    pub uri: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub failed: bool,
    /// 毫秒
    pub duration: u64,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub exception: Option<Arc<dyn Error + Send + Sync>>,
}

impl Response {
    /// 由传输层错误构造失败响应
    pub fn failed<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            failed: true,
            error_message: Some(err.to_string()),
            exception: Some(Arc::new(err)),
            ..Self::default()
        }
    }

    pub fn failed_with_message(message: impl Into<String>) -> Self {
        Self {
            failed: true,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..=399).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    pub fn entity(&self) -> Option<&Value> {
        self.body.as_ref().map(|body| &body.entity)
    }

    /// 响应体文本；结构化实体序列化为 JSON
    pub fn text(&self) -> Option<String> {
        self.entity().map(|entity| match entity {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
