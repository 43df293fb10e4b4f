use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use chrono::Utc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::chain::CallChain;
use crate::expression::ResolverRegistry;
use crate::http::{Request, Response};
use crate::result::{CallChainResult, ExecutionResult, Outcome};
use crate::runner::executor::CallExecutor;
use crate::runner::orchestrator::{ChainOrchestrator, DATASET_KEY};
use crate::runner::types::{ExecutionSchedule, SchedulingConfig};
use crate::template::{RequestTemplate, resolve_requests};
use crate::transport::{Transport, TransportDispatch, TransportRegistry};
use crate::variable::{Context, Dataset, Session};
use crate::{Result, RuchainError};

/// 已提交任务的句柄，可 `.await` 或在多线程运行时内阻塞等待
pub struct ExecutionHandle<T> {
    task: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> ExecutionHandle<T> {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待任务完成
    pub async fn join(self) -> Result<T> {
        self.await
    }

    /// 同步等待：阻塞当前线程直到任务完成
    ///
    /// 只能在多线程运行时的工作线程上调用。
    pub fn wait(self) -> Result<T> {
        let handle = Handle::try_current()
            .map_err(|_| RuchainError::config("同步等待需要在 tokio 运行时内调用"))?;
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(RuchainError::config("同步等待需要多线程 tokio 运行时"));
        }
        tokio::task::block_in_place(|| handle.block_on(self))
    }
}

impl<T> Future for ExecutionHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.map_err(RuchainError::from).and_then(|result| result))
    }
}

/// 顶层调度器：单个请求、请求集合、调用链、完整执行计划
///
/// 克隆开销很小，注册表以 `Arc` 共享。`submit_*` 立即返回句柄，需要在 tokio 运行时内调用。
#[derive(Clone)]
pub struct ExecutionScheduler {
    config: SchedulingConfig,
    resolvers: Arc<ResolverRegistry>,
    transports: Arc<TransportRegistry>,
}

impl ExecutionScheduler {
    /// 使用默认传输层注册表；脚本中的 `http()` 派发到选定的传输层
    pub fn new(config: SchedulingConfig) -> Result<Self> {
        Self::with_transports(config, TransportRegistry::default())
    }

    pub fn with_transports(config: SchedulingConfig, transports: TransportRegistry) -> Result<Self> {
        let transport = transports.get(config.transport.as_deref())?;
        let resolvers = ResolverRegistry::with_dispatcher(Arc::new(TransportDispatch::new(transport)));
        Self::with_registries(config, resolvers, transports)
    }

    /// 传输层名称在创建时校验，未注册时立即失败
    pub fn with_registries(
        config: SchedulingConfig,
        resolvers: ResolverRegistry,
        transports: TransportRegistry,
    ) -> Result<Self> {
        transports.get(config.transport.as_deref())?;
        Ok(Self {
            config,
            resolvers: Arc::new(resolvers),
            transports: Arc::new(transports),
        })
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transports.get(self.config.transport.as_deref())
    }

    pub fn submit_request(&self, request: Request) -> ExecutionHandle<Response> {
        let scheduler = self.clone();
        ExecutionHandle::spawn(async move {
            let transport = scheduler.transport()?;
            tracing::debug!(method = %request.method, uri = %request.uri, "Dispatching request");
            Ok(transport.send(&request).await)
        })
    }

    pub async fn execute_request(&self, request: Request) -> Result<Response> {
        self.submit_request(request).await
    }

    /// 独立请求集合，按配置串行或并行、重复 `iterations` 轮
    ///
    /// 返回顺序与派发顺序一致：先按轮次，轮内按输入顺序。
    pub fn submit_requests(&self, requests: Vec<Request>) -> ExecutionHandle<Vec<Response>> {
        let scheduler = self.clone();
        ExecutionHandle::spawn(async move { scheduler.run_requests(requests).await })
    }

    pub async fn execute_requests(&self, requests: Vec<Request>) -> Result<Vec<Response>> {
        self.submit_requests(requests).await
    }

    /// 解析模板（按数据集展开）后作为请求集合执行
    ///
    /// 任一请求解析失败时整个提交失败，不派发任何请求。
    pub fn submit_template(
        &self,
        template: RequestTemplate,
        session: Session,
        outer: Context,
    ) -> ExecutionHandle<Vec<Response>> {
        let scheduler = self.clone();
        ExecutionHandle::spawn(async move {
            let resolver = scheduler.resolvers.get(template.lang)?;
            let dataset = template
                .data_set
                .as_deref()
                .map(|name| lookup_dataset(&session, name))
                .transpose()?;

            let context = session.context(outer);
            let requests = resolve_requests(&template, resolver.as_ref(), &context, dataset)?;
            scheduler.run_requests(requests).await
        })
    }

    pub async fn execute_template(
        &self,
        template: RequestTemplate,
        session: Session,
        outer: Context,
    ) -> Result<Vec<Response>> {
        self.submit_template(template, session, outer).await
    }

    pub fn submit_chain(&self, chain: CallChain, context: Context) -> ExecutionHandle<CallChainResult> {
        let scheduler = self.clone();
        ExecutionHandle::spawn(async move { scheduler.run_chain(&chain, context).await })
    }

    pub async fn execute_chain(&self, chain: CallChain, context: Context) -> Result<CallChainResult> {
        self.submit_chain(chain, context).await
    }

    /// 执行完整计划；每个调用链拿到合并后会话上下文的独立副本
    pub fn submit(&self, schedule: ExecutionSchedule) -> ExecutionHandle<ExecutionResult> {
        let scheduler = self.clone();
        ExecutionHandle::spawn(async move { scheduler.run_schedule(schedule).await })
    }

    pub async fn execute(&self, schedule: ExecutionSchedule) -> Result<ExecutionResult> {
        self.submit(schedule).await
    }

    async fn run_requests(&self, requests: Vec<Request>) -> Result<Vec<Response>> {
        let transport = self.transport()?;
        let iterations = self.config.effective_iterations();
        let dispatch: Vec<Request> = (0..iterations)
            .flat_map(|_| requests.iter().cloned())
            .collect();

        tracing::debug!(
            requests = requests.len(),
            iterations,
            parallel = self.config.parallel,
            "Dispatching request collection"
        );

        if !self.config.parallel {
            let mut responses = Vec::with_capacity(dispatch.len());
            for request in &dispatch {
                responses.push(transport.send(request).await);
            }
            return Ok(responses);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.pool_size()));
        let mut tasks = JoinSet::new();
        let total = dispatch.len();

        for (index, request) in dispatch.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| RuchainError::Other(e.to_string()))?;
            let transport = Arc::clone(&transport);
            tasks.spawn(async move {
                let response = transport.send(&request).await;
                drop(permit);
                (index, response)
            });
        }

        let mut responses: Vec<Option<Response>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, response) = joined?;
            responses[index] = Some(response);
        }

        Ok(responses.into_iter().flatten().collect())
    }

    async fn run_chain(&self, chain: &CallChain, mut context: Context) -> Result<CallChainResult> {
        let resolver = self.resolvers.get(chain.expression_language)?;
        let executor = CallExecutor::new(resolver, self.transport()?);
        let orchestrator = ChainOrchestrator::new(executor).with_run_assertions(self.config.run_assertions);
        Ok(orchestrator.execute_chain(chain, &mut context).await)
    }

    async fn run_schedule(&self, schedule: ExecutionSchedule) -> Result<ExecutionResult> {
        tracing::info!(
            id = %schedule.id,
            chains = schedule.call_chains.len(),
            parallel = self.config.parallel,
            "Executing schedule"
        );

        let session = schedule.session();

        // 配置错误在派发任何请求之前暴露
        self.transport()?;
        let mut contexts = Vec::with_capacity(schedule.call_chains.len());
        let base = session.context(Context::new());
        for chain in &schedule.call_chains {
            self.resolvers.get(chain.expression_language)?;
            contexts.push(chain_context(&base, chain, &session)?);
        }

        let mut result = ExecutionResult::new(&schedule.id);
        result.assertions_run = self.config.run_assertions;
        result.environment = schedule.environment.clone();
        result.datasets = schedule.datasets.clone();
        result.vars = schedule.vars.clone();
        result.details = schedule.details.clone();
        result.start_date = Some(Utc::now());

        let chain_results = if self.config.parallel {
            let mut tasks = JoinSet::new();
            for (index, (chain, context)) in schedule.call_chains.into_iter().zip(contexts).enumerate() {
                let scheduler = self.clone();
                tasks.spawn(async move { (index, scheduler.run_chain(&chain, context).await) });
            }

            let mut ordered: Vec<Option<CallChainResult>> = vec![None; tasks.len()];
            while let Some(joined) = tasks.join_next().await {
                let (index, chain_result) = joined?;
                ordered[index] = Some(chain_result?);
            }
            ordered.into_iter().flatten().collect()
        } else {
            let mut results = Vec::with_capacity(contexts.len());
            for (chain, context) in schedule.call_chains.iter().zip(contexts) {
                results.push(self.run_chain(chain, context).await?);
            }
            results
        };

        for chain_result in chain_results {
            result.record(chain_result);
        }
        result.end_date = Some(Utc::now());

        tracing::info!(
            id = %result.id,
            successful = result.is_successful(),
            duration_ms = result.duration(),
            "Schedule finished"
        );

        Ok(result)
    }
}

fn lookup_dataset<'a>(session: &'a Session, name: &str) -> Result<&'a Dataset> {
    session
        .dataset(name)
        .ok_or_else(|| RuchainError::config(format!("未定义的数据集: {}", name)))
}

/// 调用链的独立上下文；调用链引用数据集时记录绑定到 `dataset`
fn chain_context(base: &Context, chain: &CallChain, session: &Session) -> Result<Context> {
    let mut context = base.clone();
    if let Some(name) = chain.data_set.as_deref() {
        context.insert(DATASET_KEY, lookup_dataset(session, name)?.records_value());
    }
    Ok(context)
}
