use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::assertion::evaluate_assertions;
use crate::chain::Call;
use crate::expression::Resolver;
use crate::http::{Request, Response};
use crate::result::CallResult;
use crate::template::resolve_request;
use crate::transport::Transport;
use crate::variable::Context;

/// 脚本模式下脚本写入的请求/响应变量名
pub const REQUEST_KEY: &str = "request";
pub const RESPONSE_KEY: &str = "response";

/// 单个调用的执行器：解析 → 派发 → 写回上下文 → 断言
#[derive(Clone)]
pub struct CallExecutor {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
    run_assertions: bool,
}

impl CallExecutor {
    pub fn new(resolver: Arc<dyn Resolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
            run_assertions: true,
        }
    }

    pub fn with_run_assertions(mut self, run_assertions: bool) -> Self {
        self.run_assertions = run_assertions;
        self
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    /// 执行一个调用
    ///
    /// 响应以调用 key 写入 `context`，供后续调用引用。
    /// 解析失败不会返回错误，而是得到 `executed = false` 的结果。
    pub async fn execute_call(&self, call: &Call, context: &mut Context) -> CallResult {
        let mut result = CallResult::new(&call.key);
        result.script_mode = call.script_mode;
        result.script = call.script.clone();

        let exchange = if call.script_mode {
            self.run_script(call, context, &mut result)
        } else {
            self.dispatch(call, context, &mut result).await
        };

        let Some((request, response)) = exchange else {
            return result;
        };

        if let Err(err) = context.bind(&call.key, &response) {
            tracing::warn!(call = %call.key, error = %err, "Failed to store response in context");
        }

        let local = exchange_context(request.as_ref(), &response);

        if !response.failed {
            self.bind_post_response_variables(call, &local, context);
        }

        if let Some(script) = call.response_script.as_deref() {
            if let Err(err) = self.resolver.exec(context, script) {
                tracing::warn!(call = %call.key, error = %err, "Response script failed");
                result.error = Some(err.to_string());
            }
        }

        result.executed = true;
        result.assertions_executed = self.run_assertions;

        if !response.failed && self.run_assertions {
            result.assertions = call.assertions.clone();
            result.assertion_results = Some(evaluate_assertions(
                &call.assertions,
                self.resolver.as_ref(),
                &local,
            ));
        }

        result.request = request;
        result.response = Some(response);
        result
    }

    async fn dispatch(
        &self,
        call: &Call,
        context: &Context,
        result: &mut CallResult,
    ) -> Option<(Option<Request>, Response)> {
        let request = match resolve_request(&call.request_template, self.resolver.as_ref(), context) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(call = %call.key, error = %err, "Request resolution failed");
                *result = CallResult::unresolved(&call.key, err.to_string());
                return None;
            }
        };

        tracing::debug!(
            call = %call.key,
            method = %request.method,
            uri = %request.uri,
            transport = self.transport.name(),
            "Dispatching call"
        );

        result.start_date = Some(Utc::now());
        let response = self.transport.send(&request).await;
        result.end_date = Some(Utc::now());

        if response.failed {
            tracing::warn!(
                call = %call.key,
                error = response.error_message.as_deref().unwrap_or_default(),
                "Call dispatch failed"
            );
        }

        Some((Some(request), response))
    }

    /// 脚本模式：脚本在共享上下文上执行，写入的 `request`/`response` 被取出作为本次调用的交换
    fn run_script(
        &self,
        call: &Call,
        context: &mut Context,
        result: &mut CallResult,
    ) -> Option<(Option<Request>, Response)> {
        let script = call.script.as_deref().unwrap_or_default();
        tracing::debug!(call = %call.key, "Executing call script");

        result.start_date = Some(Utc::now());
        let outcome = self.resolver.exec(context, script);
        result.end_date = Some(Utc::now());

        if let Err(err) = outcome {
            tracing::warn!(call = %call.key, error = %err, "Call script failed");
            result.error = Some(err.to_string());
            return None;
        }

        let request = context
            .remove(REQUEST_KEY)
            .and_then(|value| serde_json::from_value::<Request>(value).ok());
        let response = match context.remove(RESPONSE_KEY) {
            Some(value) => serde_json::from_value::<Response>(value).unwrap_or_else(|err| {
                Response::failed_with_message(format!("脚本写入的 response 无法识别: {}", err))
            }),
            None => Response::default(),
        };

        Some((request, response))
    }

    fn bind_post_response_variables(&self, call: &Call, local: &Context, context: &mut Context) {
        for (name, expression) in &call.request_template.post_response_variables {
            match self.resolver.eval(local, expression) {
                Ok(value) => context.insert(name.clone(), value),
                Err(err) => {
                    tracing::warn!(call = %call.key, variable = %name, error = %err, "Post-response variable skipped");
                }
            }
        }
    }
}

/// 只包含本次请求和响应的上下文，调用级断言在其上求值
pub fn exchange_context(request: Option<&Request>, response: &Response) -> Context {
    let request = request
        .and_then(|request| serde_json::to_value(request).ok())
        .unwrap_or(Value::Null);
    let response = serde_json::to_value(response).unwrap_or(Value::Null);

    Context::new()
        .with(REQUEST_KEY, request)
        .with(RESPONSE_KEY, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::assertion::Assertion;
    use crate::expression::ScriptResolver;
    use crate::http::Body;
    use crate::result::Outcome;
    use crate::template::RequestTemplate;

    /// 记录请求并按 URI 返回固定响应
    struct StubTransport {
        sent: Mutex<Vec<Request>>,
    }

    impl StubTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn name(&self) -> &str {
            "stub"
        }

        async fn send(&self, request: &Request) -> Response {
            self.sent.lock().unwrap().push(request.clone());
            if request.uri.contains("down") {
                return Response::failed_with_message("connection refused");
            }
            Response {
                status: 200,
                body: Some(Body::json(json!({"token": "abc", "uri": request.uri}))),
                ..Response::default()
            }
        }
    }

    fn executor(transport: Arc<StubTransport>) -> CallExecutor {
        CallExecutor::new(Arc::new(ScriptResolver::new()), transport)
    }

    #[tokio::test]
    async fn test_execute_call_stores_response_and_runs_assertions() {
        let transport = StubTransport::new();
        let executor = executor(transport.clone());
        let call = Call::new("login", RequestTemplate::get("http://api/${host}/login"))
            .with_assertion(Assertion::new("ok", "response.status == 200"))
            .with_assertion(Assertion::new("token", "response.body.entity.token == 'abc'"));
        let mut context = Context::new().with("host", "dev");

        let result = executor.execute_call(&call, &mut context).await;

        assert!(result.executed);
        assert!(result.assertions_executed);
        assert!(result.is_successful());
        assert_eq!(result.assertion_results.as_ref().unwrap().len(), 2);
        assert!(result.duration() >= 0);
        assert_eq!(transport.sent.lock().unwrap()[0].uri, "http://api/dev/login");
        assert_eq!(context.lookup("login.status"), Some(&json!(200)));
        assert_eq!(context.lookup("login.body.entity.token"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_assertions_see_only_request_and_response() {
        let executor = executor(StubTransport::new());
        let call = Call::new("a", RequestTemplate::get("http://api/a"))
            .with_assertion(Assertion::new("outer", "secret == 1"));
        let mut context = Context::new().with("secret", 1);

        let result = executor.execute_call(&call, &mut context).await;

        let assertion = &result.assertion_results.as_ref().unwrap()[0];
        assert!(assertion.error);
        assert!(!result.is_successful());
    }

    #[tokio::test]
    async fn test_transport_failure_skips_assertions() {
        let executor = executor(StubTransport::new());
        let call = Call::new("a", RequestTemplate::get("http://down/a"))
            .with_assertion(Assertion::new("ok", "response.status == 200"));
        let mut context = Context::new();

        let result = executor.execute_call(&call, &mut context).await;

        assert!(result.executed);
        assert!(result.transport_failed());
        assert!(result.assertion_results.is_none());
        assert!(result.is_successful());
        assert_eq!(context.lookup("a.failed"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_unresolved_call_is_not_dispatched() {
        let transport = StubTransport::new();
        let executor = executor(transport.clone());
        let call = Call::new("a", RequestTemplate::get("http://api/${missing.host}"));
        let mut context = Context::new();

        let result = executor.execute_call(&call, &mut context).await;

        assert!(!result.executed);
        assert!(result.error.as_deref().unwrap().contains("uri"));
        assert!(result.start_date.is_none());
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(!context.contains_key("a"));
    }

    #[tokio::test]
    async fn test_skip_assertions() {
        let executor = executor(StubTransport::new()).with_run_assertions(false);
        let call = Call::new("a", RequestTemplate::get("http://api/a"))
            .with_assertion(Assertion::new("never", "false"));

        let result = executor.execute_call(&call, &mut Context::new()).await;

        assert!(!result.assertions_executed);
        assert!(result.assertion_results.is_none());
        assert!(result.assertions.is_empty());
        assert!(result.is_successful());
    }

    #[tokio::test]
    async fn test_post_response_variables() {
        let executor = executor(StubTransport::new());
        let template = RequestTemplate::get("http://api/login")
            .with_post_response_variable("token", "response.body.entity.token")
            .with_post_response_variable("broken", "nothing.here");
        let call = Call::new("login", template);
        let mut context = Context::new();

        executor.execute_call(&call, &mut context).await;

        assert_eq!(context.get("token"), Some(&json!("abc")));
        assert!(!context.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_script_mode_call() {
        let transport = StubTransport::new();
        let executor = executor(transport.clone());
        let call = Call::script("scripted", "response = {status: 201, failed: false}; seen = true")
            .with_assertion(Assertion::new("created", "response.status == 201"));
        let mut context = Context::new();

        let result = executor.execute_call(&call, &mut context).await;

        assert!(result.executed);
        assert!(result.script_mode);
        assert!(result.is_successful());
        assert!(result.request.is_none());
        assert_eq!(context.get("seen"), Some(&json!(true)));
        assert_eq!(context.lookup("scripted.status"), Some(&json!(201)));
        assert!(!context.contains_key(RESPONSE_KEY));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_script_error_marks_call_unexecuted() {
        let executor = executor(StubTransport::new());
        let call = Call::script("bad", "x = missing.value");

        let result = executor.execute_call(&call, &mut Context::new()).await;

        assert!(!result.executed);
        assert!(result.error.is_some());
        assert!(!result.is_successful());
    }

    #[tokio::test]
    async fn test_response_script_runs_on_shared_context() {
        let executor = executor(StubTransport::new());
        let call = Call::new("login", RequestTemplate::get("http://api/login"))
            .with_response_script("auth = 'Bearer ' + login.body.entity.token");
        let mut context = Context::new();

        let result = executor.execute_call(&call, &mut context).await;

        assert!(result.error.is_none());
        assert_eq!(context.get("auth"), Some(&json!("Bearer abc")));
    }

    #[test]
    fn test_exchange_context() {
        let context = exchange_context(None, &Response::default());
        assert_eq!(context.get(REQUEST_KEY), Some(&Value::Null));
        assert_eq!(context.lookup("response.failed"), Some(&json!(false)));
        assert_eq!(context.len(), 2);
    }
}
