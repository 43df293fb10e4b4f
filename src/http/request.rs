use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::http::body::Body;
use crate::http::types::{AuthData, AuthType, ConnectionConfig, Method, parse_url};

/// 解析完成的请求，派发后不再修改
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    pub uri: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
    pub body: Option<Body>,
    pub auth_type: Option<AuthType>,
    pub auth_data: Option<AuthData>,
    pub data_set: Option<String>,
    pub data_set_record_id: Option<usize>,
    pub data_set_record: Option<Map<String, Value>>,
    pub connection_config: ConnectionConfig,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json(self, entity: Value) -> Self {
        self.with_body(Body::json(entity))
    }

    pub fn with_auth(mut self, auth_type: AuthType, auth_data: AuthData) -> Self {
        self.auth_type = Some(auth_type);
        self.auth_data = Some(auth_data);
        self
    }

    pub fn with_auth_bearer(self, token: &str) -> Self {
        self.with_auth(AuthType::BearerToken, AuthData::new(token))
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }

    /// 完整 URL：补全简写并追加查询参数（URL 编码）
    pub fn url(&self) -> Result<url::Url> {
        let mut url = parse_url(&self.uri)?;
        if !self.parameters.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.parameters);
        }
        Ok(url)
    }

    /// 不区分大小写查找请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_with_encoded_parameters() {
        let request = Request::get("localhost:3000/search?fixed=1")
            .with_parameter("q", "a b&c")
            .with_parameter("page", "2");

        let url = request.url().unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/search?fixed=1&page=2&q=a+b%26c"
        );
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = Request::get("http://x").with_header("Content-Type", "text/plain");
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let request: Request = serde_json::from_value(json!({
            "uri": "http://localhost/items",
            "method": "POST",
            "body": {"entity": {"a": 1}, "mediaType": "application/json"}
        }))
        .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.unwrap().entity, json!({"a": 1}));
        assert_eq!(request.connection_config, ConnectionConfig::default());
    }
}
