use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, RuchainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
}

impl FromStr for Method {
    type Err = RuchainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            _ => Err(RuchainError::config(format!("Invalid HTTP method: {}", s))),
        }
    }
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }

    /// 是否携带请求体（只有 POST / PUT / PATCH 会解析请求体模板）
    pub fn is_bodied(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Trace => reqwest::Method::TRACE,
            Method::Connect => reqwest::Method::CONNECT,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    /// `Authorization: Basic base64(user:password)`
    BasicAuth,
    /// `Authorization: Bearer <token>`，或者以 `headerName` 原样发送
    BearerToken,
}

/// 解析后的认证数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthData {
    pub username: Option<String>,
    pub credentials: String,
    pub header_name: Option<String>,
}

impl AuthData {
    pub fn new(credentials: impl Into<String>) -> Self {
        Self {
            credentials: credentials.into(),
            ..Self::default()
        }
    }

    pub fn with_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = Some(header_name.into()).filter(|h: &String| !h.trim().is_empty());
        self
    }

    /// Basic 认证的用户名和密码；未单独给出用户名时按 `user:password` 拆分凭据
    pub fn basic_pair(&self) -> (String, Option<String>) {
        match &self.username {
            Some(user) => (user.clone(), Some(self.credentials.clone())),
            None => match self.credentials.split_once(':') {
                Some((user, password)) => (user.to_string(), Some(password.to_string())),
                None => (self.credentials.clone(), None),
            },
        }
    }
}

/// 连接参数，同一组参数复用同一个底层客户端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    pub validate_host_names: bool,
    /// 毫秒
    pub connection_timeout: u64,
    /// 毫秒，0 表示不限制
    pub read_timeout: u64,
    pub follow_redirects: bool,
}

impl ConnectionConfig {
    const FALLBACK_CONNECTION_TIMEOUT: u64 = 10_000;

    pub fn new(
        validate_host_names: bool,
        connection_timeout: u64,
        read_timeout: u64,
        follow_redirects: bool,
    ) -> Self {
        Self {
            validate_host_names,
            connection_timeout,
            read_timeout,
            follow_redirects,
        }
    }

    /// 小于 1 的连接超时回退为 10 秒
    pub fn effective_connection_timeout(&self) -> u64 {
        if self.connection_timeout < 1 {
            Self::FALLBACK_CONNECTION_TIMEOUT
        } else {
            self.connection_timeout
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(true, 60_000, 180_000, false)
    }
}

/// 默认 host，当 URL 中未指定 host 时使用
const DEFAULT_HOST: &str = "localhost";
/// 默认 scheme，当 URL 中未指定 scheme 时使用
const DEFAULT_SCHEME: &str = "http";

/// 解析 URL，补全简写形式
///
/// 1. ":3000" -> "http://localhost:3000"
/// 2. "localhost:3000" -> "http://localhost:3000"
/// 3. "https://:8080" -> "https://localhost:8080"
pub fn parse_url(s: &str) -> Result<url::Url> {
    let input = s.trim();

    let normalized = if input.starts_with(':') {
        format!("{}://{}{}", DEFAULT_SCHEME, DEFAULT_HOST, input)
    } else if let Some(pos) = input.find("://") {
        let after_scheme = &input[pos + 3..];
        if after_scheme.starts_with(':') {
            format!("{}://{}{}", &input[..pos], DEFAULT_HOST, after_scheme)
        } else {
            input.to_string()
        }
    } else {
        format!("{}://{}", DEFAULT_SCHEME, input)
    };

    Ok(url::Url::parse(&normalized)?)
}

pub fn reason_phrase(code: u16) -> Option<&'static str> {
    reqwest::StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
}
