use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 求值上下文：模板/脚本求值时的变量绑定，同时也是调用链内部的数据总线
///
/// 一个 `Context` 只归属于一次调用链执行，不做跨线程共享。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    bindings: Map<String, Value>,
}

impl Context {
    /// 创建新的空上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入变量，同名变量被覆盖
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(key.into(), value.into());
    }

    /// 链式插入，便于构建测试/局部上下文
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// 序列化任意对象后绑定
    pub fn bind<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.bindings.insert(key.into(), value);
        Ok(())
    }

    /// 获取变量值
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    /// 按点号路径查找，例如 `login.body.entity.token`
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.bindings.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.bindings.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// 批量插入变量，后插入的覆盖先插入的
    pub fn extend<I, K>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in vars {
            self.bindings.insert(key.into(), value);
        }
    }

    /// 合并另一个上下文，`other` 中的值优先
    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.bindings {
            self.bindings.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.bindings
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.bindings)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(bindings: Map<String, Value>) -> Self {
        Self { bindings }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut context = Context::new();
        context.extend(iter);
        context
    }
}

/// 环境配置，`vars` 在合并时优先级最高
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub key: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub production: bool,
    pub vars: Map<String, Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            key: String::new(),
            name: None,
            description: None,
            production: true,
            vars: Map::new(),
        }
    }
}

impl Environment {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// 命名变量包
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vars {
    pub key: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub values: Map<String, Value>,
}

impl Vars {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// 数据集：一组记录，每条记录可派生出一个请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub media_type: Option<String>,
    pub uri: Option<String>,
    pub records: Vec<Map<String, Value>>,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_record(mut self, record: Map<String, Value>) -> Self {
        self.records.push(record);
        self
    }

    pub fn records_value(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|record| Value::Object(record.clone()))
                .collect(),
        )
    }
}
