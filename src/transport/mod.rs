//! 可插拔传输层
//!
//! 核心只依赖 [`Transport`]：发送请求、得到响应。网络失败一律表示为 `Response { failed: true }`。

pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::expression::ScriptDispatch;
use crate::http::{Request, Response};
use crate::{Result, RuchainError};

pub use self::http::HttpTransport;

/// 默认传输层名称
pub const DEFAULT_TRANSPORT: &str = "http";

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// 发送请求；不返回错误，失败体现在响应里
    async fn send(&self, request: &Request) -> Response;
}

/// 具名传输层注册表，其中一个为默认
#[derive(Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
    default: String,
}

impl TransportRegistry {
    /// 以给定传输层作为默认创建注册表
    pub fn new(default: Arc<dyn Transport>) -> Self {
        let name = default.name().to_string();
        let mut transports = HashMap::new();
        transports.insert(name.clone(), default);
        Self {
            transports,
            default: name,
        }
    }

    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports
            .insert(transport.name().to_string(), transport);
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.transports.contains_key(name) {
            return Err(RuchainError::config(format!("未注册的传输层: {}", name)));
        }
        self.default = name.to_string();
        Ok(())
    }

    /// 按名称获取；`None` 返回默认传输层
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn Transport>> {
        let name = name.unwrap_or(&self.default);
        self.transports
            .get(name)
            .cloned()
            .ok_or_else(|| RuchainError::config(format!("未注册的传输层: {}", name)))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.names())
            .field("default", &self.default)
            .finish()
    }
}

/// 让脚本中的 `http(request)` 通过传输层派发
///
/// 脚本求值是同步的，这里在多线程运行时上用 `block_in_place` 等待响应。
pub struct TransportDispatch {
    transport: Arc<dyn Transport>,
}

impl TransportDispatch {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ScriptDispatch for TransportDispatch {
    fn dispatch(&self, request: Request) -> Response {
        let Ok(handle) = Handle::try_current() else {
            return Response::failed_with_message("script dispatch requires a tokio runtime");
        };
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Response::failed_with_message(
                "script dispatch requires a multi-thread tokio runtime",
            );
        }

        tracing::debug!(uri = %request.uri, method = %request.method, "Script dispatch");
        tokio::task::block_in_place(|| handle.block_on(self.transport.send(&request)))
    }
}
