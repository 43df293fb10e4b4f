use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::assertion::Assertion;
use crate::expression::Language;
use crate::template::RequestTemplate;

/// 一次调用：一个请求模板加上它的断言
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Call {
    /// 在所属调用链内唯一
    pub key: String,
    pub description: Option<String>,
    pub comments: Option<String>,
    /// 已声明的依赖；执行顺序按 key 字典序，不参考该字段
    pub depends_on: Vec<String>,
    pub assertions: Vec<Assertion>,
    /// 为 true 时执行 `script` 而不是解析请求模板
    pub script_mode: bool,
    pub script: Option<String>,
    /// 响应写入上下文之后执行
    pub response_script: Option<String>,
    pub request_template: RequestTemplate,
}

impl Call {
    pub fn new(key: impl Into<String>, request_template: RequestTemplate) -> Self {
        Self {
            key: key.into(),
            request_template,
            ..Self::default()
        }
    }

    /// 脚本模式调用
    pub fn script(key: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            script_mode: true,
            script: Some(script.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_depends_on(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }

    pub fn with_response_script(mut self, script: impl Into<String>) -> Self {
        self.response_script = Some(script.into());
        self
    }
}

/// 调用链：共享同一个表达式语言和求值上下文的一组调用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallChain {
    pub key: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_calls")]
    pub calls: BTreeMap<String, Call>,
    /// 所有调用结束后针对调用链上下文求值
    pub assertions: Vec<Assertion>,
    pub expression_language: Language,
    pub data_set: Option<String>,
}

impl CallChain {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// 添加调用；同 key 的调用被替换
    pub fn with_call(mut self, call: Call) -> Self {
        self.calls.insert(call.key.clone(), call);
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.expression_language = language;
        self
    }

    pub fn with_data_set(mut self, data_set: impl Into<String>) -> Self {
        self.data_set = Some(data_set.into());
        self
    }

    /// 执行顺序：按调用 key 的字典序
    pub fn ordered_calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.values()
    }
}

/// 调用的 key 以 `calls` 中的键为准
fn deserialize_calls<'de, D>(deserializer: D) -> Result<BTreeMap<String, Call>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut calls = BTreeMap::<String, Call>::deserialize(deserializer)?;
    for (key, call) in calls.iter_mut() {
        call.key = key.clone();
    }
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_calls_are_ordered_by_key() {
        let chain = CallChain::new("c")
            .with_call(Call::new("b-second", RequestTemplate::get("http://x/b")))
            .with_call(Call::new("a-first", RequestTemplate::get("http://x/a")).with_depends_on("b-second"))
            .with_call(Call::new("c-third", RequestTemplate::get("http://x/c")));

        let keys: Vec<&str> = chain.ordered_calls().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a-first", "b-second", "c-third"]);
    }

    #[test]
    fn test_deserialize_chain() {
        let chain: CallChain = serde_json::from_value(json!({
            "key": "login-flow",
            "expressionLanguage": "script",
            "calls": {
                "1-login": {
                    "key": "1-login",
                    "requestTemplate": {"method": "POST", "uriTemplate": "http://x/login"},
                    "assertions": [{"id": "ok", "booleanExpression": "response.status == 200"}]
                }
            }
        }))
        .unwrap();

        let call = &chain.calls["1-login"];
        assert_eq!(call.assertions.len(), 1);
        assert!(!call.script_mode);
        assert_eq!(chain.expression_language, Language::Script);
    }

    #[test]
    fn test_call_keys_follow_map_keys() {
        let chain: CallChain = serde_json::from_value(json!({
            "key": "flow",
            "calls": {
                "a": {"requestTemplate": {"uriTemplate": "http://x/a"}},
                "b": {"key": "other", "requestTemplate": {"uriTemplate": "http://x/b"}},
                "c": {"requestTemplate": {"uriTemplate": "http://x/c"}}
            }
        }))
        .unwrap();

        let keys: Vec<&str> = chain.ordered_calls().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
