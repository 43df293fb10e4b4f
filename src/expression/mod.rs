//! 表达式语言：模板与脚本的求值抽象
//!
//! 每种语言一个 [`Resolver`] 实现，通过 [`ResolverRegistry`] 按 [`Language`] 标签选取。
//! 内置实现是 [`ScriptResolver`]（`$` 插值的小型脚本方言）。

mod eval;
mod lexer;
mod parser;
mod script;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Result, RuchainError};
use crate::http::{Request, Response};
use crate::variable::{Context, Session};

pub use parser::{BinaryOp, Expr, Program, Statement, TemplatePart, UnaryOp, parse_program};
pub use script::ScriptResolver;

/// 表达式求值错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// 表达式语言标签，出现在模板和调用链上
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Script,
    JavaScript,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Script => "script",
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }

    /// 模板中出现该标记时才需要交给解析器求值
    pub fn interpolation_marker(&self) -> &'static str {
        match self {
            Language::Script => "$",
            Language::JavaScript => "${",
            Language::Python => "{",
        }
    }

    pub fn is_dynamic(&self, template: &str) -> bool {
        template.contains(self.interpolation_marker())
    }

    /// 把原始模板包装成该语言的多行插值字符串字面量
    ///
    /// 包装后的模板可以安全地包含引号和换行。
    pub fn quote_template(&self, template: &str) -> String {
        match self {
            Language::Script => format!("\"\"\"{}\"\"\"", escape(template, '"')),
            Language::JavaScript => format!("`{}`", escape(template, '`')),
            Language::Python => format!("f\"\"\"{}\"\"\"", escape(template, '"')),
        }
    }
}

/// 反斜杠和结束引号前各加一个反斜杠
fn escape(template: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(template.len());
    for c in template.chars() {
        if c == '\\' || c == quote {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = RuchainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "script" | "groovy" => Ok(Language::Script),
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            other => Err(RuchainError::config(format!("不支持的表达式语言: {}", other))),
        }
    }
}

/// 模板/脚本求值器
///
/// 实现必须是无状态的（或内部同步的），同一个实例会被多个调用、多个调用链共享。
pub trait Resolver: Send + Sync {
    fn language(&self) -> Language;

    /// 对单个模板求值
    fn eval(&self, context: &Context, template: &str) -> std::result::Result<Value, ResolveError>;

    /// 批量求值，保留键
    fn eval_all(
        &self,
        context: &Context,
        templates: &BTreeMap<String, String>,
    ) -> std::result::Result<BTreeMap<String, Value>, ResolveError> {
        templates
            .iter()
            .map(|(key, template)| Ok((key.clone(), self.eval(context, template)?)))
            .collect()
    }

    /// 执行完整脚本，脚本中的赋值写回 `context`
    fn exec(&self, context: &mut Context, script: &str) -> std::result::Result<(), ResolveError>;

    /// 会话级求值：按 outer < vars < datasets < environment 的优先级合并后求值
    fn eval_session(
        &self,
        template: &str,
        session: &Session,
        outer: Context,
    ) -> std::result::Result<Value, ResolveError> {
        self.eval(&session.context(outer), template)
    }
}

/// 脚本中 `http(request)` 的派发能力，由调用方显式注入
pub trait ScriptDispatch: Send + Sync {
    fn dispatch(&self, request: Request) -> Response;
}

/// 语言 → 解析器
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<Language, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// 默认脚本解析器带上派发能力
    pub fn with_dispatcher(dispatcher: Arc<dyn ScriptDispatch>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ScriptResolver::with_dispatcher(dispatcher)));
        registry
    }

    /// 注册解析器，同语言的旧实现被替换
    pub fn register(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.insert(resolver.language(), resolver);
    }

    /// 获取解析器；未注册的语言属于配置错误
    pub fn get(&self, language: Language) -> Result<Arc<dyn Resolver>> {
        self.resolvers.get(&language).cloned().ok_or_else(|| {
            RuchainError::config(format!("未注册表达式语言 {} 的解析器", language))
        })
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.resolvers.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ScriptResolver::new()));
        registry
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
