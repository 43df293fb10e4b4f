use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::expression::eval::Evaluator;
use crate::expression::parser::parse_program;
use crate::expression::{Language, ResolveError, Resolver, ScriptDispatch};
use crate::variable::Context;

/// 内置脚本方言的解析器
///
/// 无状态，每次求值重新解析；`http(request)` 只在注入派发器后可用。
#[derive(Clone, Default)]
pub struct ScriptResolver {
    dispatcher: Option<Arc<dyn ScriptDispatch>>,
}

impl ScriptResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatcher(dispatcher: Arc<dyn ScriptDispatch>) -> Self {
        Self {
            dispatcher: Some(dispatcher),
        }
    }

    fn evaluator<'a>(&'a self, context: &'a Context) -> Evaluator<'a> {
        Evaluator::new(context, self.dispatcher.as_deref())
    }
}

impl Resolver for ScriptResolver {
    fn language(&self) -> Language {
        Language::Script
    }

    fn eval(&self, context: &Context, template: &str) -> Result<Value, ResolveError> {
        let program = parse_program(template)?;
        tracing::trace!(template, "Evaluating template");
        self.evaluator(context).run(&program)
    }

    fn exec(&self, context: &mut Context, script: &str) -> Result<(), ResolveError> {
        let program = parse_program(script)?;
        tracing::debug!(statements = program.statements.len(), "Executing script");

        let locals = {
            let mut evaluator = self.evaluator(context);
            evaluator.run(&program)?;
            evaluator.into_locals()
        };
        context.extend(locals);
        Ok(())
    }
}

impl fmt::Debug for ScriptResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptResolver")
            .field("dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}
