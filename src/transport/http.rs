use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::redirect;
use serde_json::Value;

use crate::http::body::{Body, BodyPart, PartContent};
use crate::http::types::reason_phrase;
use crate::http::{AuthType, ConnectionConfig, Request, Response};
use crate::transport::{DEFAULT_TRANSPORT, Transport};
use crate::{Result, RuchainError};

/// 基于 reqwest 的 HTTP 传输层
///
/// 每组 [`ConnectionConfig`] 对应一个缓存的客户端，连接池在请求之间复用。
#[derive(Default)]
pub struct HttpTransport {
    clients: Mutex<HashMap<ConnectionConfig, reqwest::Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, config: &ConnectionConfig) -> Result<reqwest::Client> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| RuchainError::Other("HTTP 客户端缓存锁已损坏".to_string()))?;

        if let Some(client) = clients.get(config) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.effective_connection_timeout()));
        if config.read_timeout > 0 {
            builder = builder.read_timeout(Duration::from_millis(config.read_timeout));
        }
        builder = if config.follow_redirects {
            builder.redirect(redirect::Policy::limited(10))
        } else {
            builder.redirect(redirect::Policy::none())
        };
        if !config.validate_host_names {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;
        clients.insert(*config, client.clone());
        Ok(client)
    }

    async fn execute(&self, request: &Request) -> Result<Response> {
        let client = self.client(&request.connection_config)?;
        let url = request.url()?;

        let mut builder = client.request(request.method.to_reqwest(), url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let (Some(auth_type), Some(auth_data)) = (request.auth_type, &request.auth_data) {
            builder = match auth_type {
                AuthType::BasicAuth => {
                    let (user, password) = auth_data.basic_pair();
                    builder.basic_auth(user, password)
                }
                AuthType::BearerToken => match &auth_data.header_name {
                    Some(header) => builder.header(header.as_str(), auth_data.credentials.as_str()),
                    None => builder.bearer_auth(&auth_data.credentials),
                },
            };
        }

        if request.method.is_bodied()
            && let Some(body) = &request.body
        {
            if body.multipart {
                builder = builder.multipart(multipart_form(&body.parts).await?);
            } else {
                if let Some(content_type) = body.content_type()
                    && request.header(CONTENT_TYPE.as_str()).is_none()
                {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
                builder = builder.body(body.entity_bytes());
            }
        }

        let start = Instant::now();
        let response = builder.send().await?;

        let status = response.status();
        let uri = response.url().to_string();
        let headers = header_map(response.headers());
        let cookies = cookies(response.headers());
        let media_type = headers.get(CONTENT_TYPE.as_str()).cloned();
        let bytes = response.bytes().await?;
        let duration = start.elapsed();

        Ok(Response {
            status: status.as_u16(),
            status_reason: status
                .canonical_reason()
                .or_else(|| reason_phrase(status.as_u16()))
                .map(str::to_string),
            length: Some(bytes.len() as u64),
            body: Some(response_body(&bytes, media_type)),
            uri: Some(uri),
            headers,
            cookies,
            failed: false,
            duration: duration.as_millis() as u64,
            error_message: None,
            exception: None,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        DEFAULT_TRANSPORT
    }

    async fn send(&self, request: &Request) -> Response {
        let start = Instant::now();
        match self.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(uri = %request.uri, error = %err, "Request failed");
                let mut response = Response::failed(err);
                response.uri = Some(request.uri.clone());
                response.duration = start.elapsed().as_millis() as u64;
                response
            }
        }
    }
}

async fn multipart_form(parts: &[BodyPart]) -> Result<Form> {
    let mut form = Form::new();
    for body_part in parts {
        let mut part = match &body_part.content {
            PartContent::Text(text) => Part::text(text.clone()),
            PartContent::Bytes(bytes) => Part::bytes(bytes.clone()),
            PartContent::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    RuchainError::Content(format!("{}: {}", path.display(), e))
                })?;
                Part::stream_with_length(reqwest::Body::from(file), body_part.size)
            }
        };

        if let Some(file_name) = &body_part.file_name {
            part = part.file_name(file_name.clone());
        }
        if let Some(media_type) = &body_part.media_type {
            part = part.mime_str(media_type)?;
        }
        if !body_part.headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (key, value) in &body_part.headers {
                let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| RuchainError::Content(format!("{}: {}", key, e)))?;
                let value = reqwest::header::HeaderValue::from_str(value)
                    .map_err(|e| RuchainError::Content(format!("{}: {}", key, e)))?;
                headers.insert(name, value);
            }
            part = part.headers(headers);
        }

        form = form.part(body_part.name.clone(), part);
    }
    Ok(form)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// 从 Set-Cookie 头中提取 name=value
fn cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// JSON 响应解析为结构化实体，其他内容按文本保存
fn response_body(bytes: &[u8], media_type: Option<String>) -> Body {
    let is_json = media_type
        .as_deref()
        .is_some_and(|m| m.to_ascii_lowercase().contains("json"));

    let entity = if bytes.is_empty() {
        Value::Null
    } else if is_json {
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
    } else {
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    };

    let char_set = media_type.as_deref().and_then(|m| {
        m.split(';')
            .filter_map(|param| param.trim().strip_prefix("charset="))
            .next()
            .map(|c| c.trim_matches('"').to_string())
    });

    Body {
        entity,
        media_type: media_type.map(|m| m.split(';').next().unwrap_or_default().trim().to_string()),
        char_set,
        multipart: false,
        parts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_response_body_parses_json() {
        let body = response_body(
            br#"{"id": 1}"#,
            Some("application/json; charset=utf-8".to_string()),
        );
        assert_eq!(body.entity, json!({"id": 1}));
        assert_eq!(body.media_type.as_deref(), Some("application/json"));
        assert_eq!(body.char_set.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_response_body_keeps_invalid_json_as_text() {
        let body = response_body(b"not json", Some("application/json".to_string()));
        assert_eq!(body.entity, json!("not json"));

        let body = response_body(b"", None);
        assert_eq!(body.entity, Value::Null);
    }

    #[test]
    fn test_cookies_from_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc; Path=/; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark"));

        let cookies = cookies(&headers);
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn test_client_cached_per_config() {
        let transport = HttpTransport::new();
        let config = ConnectionConfig::default();
        transport.client(&config).unwrap();
        transport.client(&config).unwrap();
        transport
            .client(&ConnectionConfig::new(false, 0, 0, true))
            .unwrap();

        assert_eq!(transport.clients.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_failed_response() {
        let transport = HttpTransport::new();
        let request = Request::get("http://127.0.0.1:1/unreachable")
            .with_connection_config(ConnectionConfig::new(true, 500, 500, false));

        let response = transport.send(&request).await;
        assert!(response.failed);
        assert_eq!(response.status, 0);
        assert!(response.error_message.is_some());
    }
}
