use chrono::Utc;
use serde_json::Value;

use crate::assertion::evaluate_assertions;
use crate::chain::CallChain;
use crate::result::{CallChainResult, Outcome};
use crate::runner::executor::CallExecutor;
use crate::variable::Context;

/// 调用链上下文中调用结果的变量名，仅调用链级断言可见
pub const RESULTS_KEY: &str = "results";

/// 调用链上下文中数据集记录的变量名
pub const DATASET_KEY: &str = "dataset";

/// 调用链编排：按 key 字典序依次执行调用，共享同一个上下文
pub struct ChainOrchestrator {
    executor: CallExecutor,
    run_assertions: bool,
}

impl ChainOrchestrator {
    pub fn new(executor: CallExecutor) -> Self {
        Self {
            executor,
            run_assertions: true,
        }
    }

    pub fn with_run_assertions(mut self, run_assertions: bool) -> Self {
        self.executor = self.executor.with_run_assertions(run_assertions);
        self.run_assertions = run_assertions;
        self
    }

    /// 执行整个调用链
    ///
    /// 单个调用的失败不会中断后续调用；每个调用都会得到一个结果。
    pub async fn execute_chain(&self, chain: &CallChain, context: &mut Context) -> CallChainResult {
        tracing::info!(chain = %chain.key, calls = chain.calls.len(), "Executing call chain");

        let mut result = CallChainResult::new(&chain.key);
        result.start_date = Some(Utc::now());

        for call in chain.ordered_calls() {
            let call_result = self.executor.execute_call(call, context).await;
            result.record(call_result);
        }
        result.succeeded = true;

        if self.run_assertions && !chain.assertions.is_empty() {
            let mut chain_context = context.clone();
            chain_context.insert(
                RESULTS_KEY,
                serde_json::to_value(&result.call_results).unwrap_or(Value::Null),
            );
            result.assertion_results = Some(evaluate_assertions(
                &chain.assertions,
                self.executor.resolver(),
                &chain_context,
            ));
        }

        result.end_date = Some(Utc::now());

        tracing::info!(
            chain = %chain.key,
            successful = result.is_successful(),
            duration_ms = result.duration(),
            "Call chain finished"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::assertion::Assertion;
    use crate::chain::Call;
    use crate::expression::ScriptResolver;
    use crate::http::{Body, Request, Response};
    use crate::template::RequestTemplate;
    use crate::transport::Transport;

    /// 按请求路径回显；路径包含 `down` 时模拟连接失败
    struct EchoTransport {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        fn name(&self) -> &str {
            "echo"
        }

        async fn send(&self, request: &Request) -> Response {
            self.order.lock().unwrap().push(request.uri.clone());
            if request.uri.contains("down") {
                return Response::failed_with_message("connection refused");
            }
            Response {
                status: 200,
                body: Some(Body::json(json!({"uri": request.uri, "token": "t-1"}))),
                ..Response::default()
            }
        }
    }

    fn orchestrator() -> (ChainOrchestrator, Arc<EchoTransport>) {
        let transport = Arc::new(EchoTransport {
            order: Mutex::new(Vec::new()),
        });
        let executor = CallExecutor::new(Arc::new(ScriptResolver::new()), transport.clone());
        (ChainOrchestrator::new(executor), transport)
    }

    fn ok(id: &str) -> Assertion {
        Assertion::new(id, "response.status == 200")
    }

    #[tokio::test]
    async fn test_calls_run_in_key_order_and_share_context() {
        let (orchestrator, transport) = orchestrator();
        let chain = CallChain::new("flow")
            .with_call(Call::new(
                "profile",
                RequestTemplate::get("http://api/profile/${login.body.entity.token}"),
            ))
            .with_call(Call::new("login", RequestTemplate::get("http://api/login")));
        let mut context = Context::new();

        let result = orchestrator.execute_chain(&chain, &mut context).await;

        assert!(result.succeeded);
        assert!(result.is_successful());
        assert_eq!(
            *transport.order.lock().unwrap(),
            vec!["http://api/login", "http://api/profile/t-1"]
        );
        assert!(context.contains_key("login"));
        assert!(context.contains_key("profile"));
    }

    #[tokio::test]
    async fn test_failed_call_does_not_stop_chain() {
        let (orchestrator, transport) = orchestrator();
        let chain = CallChain::new("flow")
            .with_call(Call::new("1", RequestTemplate::get("http://api/1")).with_assertion(ok("s1")))
            .with_call(Call::new("2", RequestTemplate::get("http://down/2")).with_assertion(ok("s2")))
            .with_call(Call::new("3", RequestTemplate::get("http://api/3")).with_assertion(ok("s3")));

        let result = orchestrator.execute_chain(&chain, &mut Context::new()).await;

        assert_eq!(transport.order.lock().unwrap().len(), 3);
        assert_eq!(result.call_results.len(), 3);
        assert!(result.call_results["2"].transport_failed());
        assert!(result.call_results["2"].assertion_results.is_none());
        assert!(result.call_results["1"].assertion_results.is_some());
        assert!(result.call_results["3"].assertion_results.is_some());
        assert!(result.is_successful());
    }

    #[tokio::test]
    async fn test_unresolved_call_fails_chain_but_chain_continues() {
        let (orchestrator, transport) = orchestrator();
        let chain = CallChain::new("flow")
            .with_call(Call::new("a", RequestTemplate::get("http://api/${nope.x}")))
            .with_call(Call::new("b", RequestTemplate::get("http://api/b")));

        let result = orchestrator.execute_chain(&chain, &mut Context::new()).await;

        assert_eq!(transport.order.lock().unwrap().len(), 1);
        assert!(!result.call_results["a"].executed);
        assert!(result.is_succeeded());
        assert!(!result.is_successful());
    }

    #[tokio::test]
    async fn test_chain_assertions_see_results() {
        let (orchestrator, _) = orchestrator();
        let chain = CallChain::new("flow")
            .with_call(Call::new("a", RequestTemplate::get("http://api/a")))
            .with_assertion(Assertion::new("executed", "results.a.executed"))
            .with_assertion(Assertion::new("status", "a.status == 201").with_message("\"got ${a.status}\""));

        let result = orchestrator.execute_chain(&chain, &mut Context::new()).await;

        let assertions = result.assertion_results.as_ref().unwrap();
        assert!(assertions[0].succeeded);
        assert!(!assertions[1].succeeded);
        assert_eq!(assertions[1].expectation_message.as_deref(), Some("got 200"));
        assert!(!result.is_succeeded());
        assert!(!result.is_successful());
    }

    #[tokio::test]
    async fn test_skip_assertions_for_chain() {
        let (orchestrator, _) = orchestrator();
        let orchestrator = orchestrator.with_run_assertions(false);
        let chain = CallChain::new("flow")
            .with_call(Call::new("a", RequestTemplate::get("http://api/a")).with_assertion(Assertion::new("x", "false")))
            .with_assertion(Assertion::new("y", "false"));

        let result = orchestrator.execute_chain(&chain, &mut Context::new()).await;

        assert!(result.assertion_results.is_none());
        assert!(result.call_results["a"].assertion_results.is_none());
        assert!(result.is_successful());
    }

    #[tokio::test]
    async fn test_loaded_chain_results_keyed_by_call_map() {
        let (orchestrator, transport) = orchestrator();
        let chain: CallChain = serde_json::from_value(json!({
            "key": "loaded",
            "calls": {
                "a": {"requestTemplate": {"uriTemplate": "http://api/a"}},
                "b": {"key": "renamed", "requestTemplate": {"uriTemplate": "http://api/b"}},
                "c": {"requestTemplate": {"uriTemplate": "http://api/c/${b.status}"}}
            }
        }))
        .unwrap();
        let mut context = Context::new();

        let result = orchestrator.execute_chain(&chain, &mut context).await;

        assert_eq!(transport.order.lock().unwrap().len(), 3);
        let keys: Vec<&str> = result.call_results.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(result.call_results["c"].executed);
        assert!(context.contains_key("b"));
        assert!(!context.contains_key("renamed"));
    }
}
