use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chain::CallChain;
use crate::variable::types::{Context, Dataset, Environment, Vars};

/// 保留键：命名空间形式访问合并后的变量
pub const ENV_KEY: &str = "env";
pub const DATA_KEY: &str = "data";
pub const VARS_KEY: &str = "vars";
pub const CHAINS_KEY: &str = "chains";

/// 一次会话可见的全部变量来源
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub environment: Environment,
    pub datasets: BTreeMap<String, Dataset>,
    pub vars: BTreeMap<String, Vars>,
    pub call_chains: BTreeMap<String, CallChain>,
}

impl Session {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    pub fn with_dataset(mut self, name: impl Into<String>, dataset: Dataset) -> Self {
        self.datasets.insert(name.into(), dataset);
        self
    }

    pub fn with_vars(mut self, name: impl Into<String>, vars: Vars) -> Self {
        self.vars.insert(name.into(), vars);
        self
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    /// 构建合并后的求值上下文
    ///
    /// 合并顺序（后者覆盖前者）：
    /// 1. 外部上下文 `outer`
    /// 2. 各个 vars 变量包（按名称绑定）
    /// 3. 各个数据集（按名称绑定为记录数组）
    /// 4. 环境变量（平铺，优先级最高）
    ///
    /// 最后再以 `env` / `data` / `vars` 保留键提供命名空间访问。
    pub fn context(&self, outer: Context) -> Context {
        let mut context = outer;

        for (name, vars) in &self.vars {
            context.insert(name.clone(), Value::Object(vars.values.clone()));
        }

        for (name, dataset) in &self.datasets {
            context.insert(name.clone(), dataset.records_value());
        }

        for (key, value) in &self.environment.vars {
            context.insert(key.clone(), value.clone());
        }

        context.insert(ENV_KEY, Value::Object(self.environment.vars.clone()));
        context.insert(DATA_KEY, self.datasets_value());
        context.insert(VARS_KEY, self.vars_value());

        if !self.call_chains.is_empty() {
            let chains = serde_json::to_value(&self.call_chains).unwrap_or(Value::Null);
            context.insert(CHAINS_KEY, chains);
        }

        context
    }

    fn datasets_value(&self) -> Value {
        let map: Map<String, Value> = self
            .datasets
            .iter()
            .map(|(name, dataset)| (name.clone(), dataset.records_value()))
            .collect();
        Value::Object(map)
    }

    fn vars_value(&self) -> Value {
        let map: Map<String, Value> = self
            .vars
            .iter()
            .map(|(name, vars)| (name.clone(), Value::Object(vars.values.clone())))
            .collect();
        Value::Object(map)
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        let environment = Environment::new("dev")
            .with_var("host", "env-host")
            .with_var("shared", "from-env");

        Session::new(environment)
            .with_vars("defaults", Vars::new("defaults").with_value("retries", 3))
            .with_dataset(
                "users",
                Dataset::new("users").with_record(json!({"id": 1}).as_object().unwrap().clone()),
            )
    }

    #[test]
    fn test_environment_has_highest_precedence() {
        let outer = Context::new()
            .with("shared", "from-outer")
            .with("defaults", "from-outer")
            .with("only_outer", true);

        let mut session = session();
        session
            .environment
            .vars
            .insert("defaults".to_string(), json!("from-env"));

        let context = session.context(outer);
        assert_eq!(context.get("shared"), Some(&json!("from-env")));
        assert_eq!(context.get("defaults"), Some(&json!("from-env")));
        assert_eq!(context.get("only_outer"), Some(&json!(true)));
    }

    #[test]
    fn test_datasets_override_vars_and_outer() {
        let outer = Context::new().with("users", "outer");
        let session = session().with_vars("users", Vars::new("users").with_value("x", 1));

        let context = session.context(outer);
        assert_eq!(context.get("users"), Some(&json!([{"id": 1}])));
    }

    #[test]
    fn test_namespaced_keys() {
        let context = session().context(Context::new());

        assert_eq!(context.lookup("env.host"), Some(&json!("env-host")));
        assert_eq!(context.lookup("vars.defaults.retries"), Some(&json!(3)));
        assert_eq!(context.lookup("data.users.0.id"), Some(&json!(1)));
        assert_eq!(context.lookup("defaults.retries"), Some(&json!(3)));
        assert!(!context.contains_key(CHAINS_KEY));
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(
            Session::parse_var("key=value"),
            Some(("key".to_string(), "value".to_string()))
        );
        assert_eq!(
            Session::parse_var("url=https://example.com?a=b"),
            Some(("url".to_string(), "https://example.com?a=b".to_string()))
        );
        assert_eq!(Session::parse_var("invalid"), None);
        assert_eq!(Session::parse_var("=value"), None);
    }
}
