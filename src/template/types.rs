use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::expression::Language;
use crate::http::{AuthType, ConnectionConfig, Method};

/// 请求模板：字段在解析时通过表达式语言求值
///
/// 构建后不再修改；同一个模板可以派生出多个请求（例如每条数据集记录一个）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestTemplate {
    pub key: String,
    pub lang: Language,
    pub uri_template: String,
    pub header_templates: BTreeMap<String, String>,
    pub parameter_templates: BTreeMap<String, String>,
    pub method: Method,
    pub entity_template: Option<String>,
    pub media_type: Option<String>,
    pub auth_type: Option<AuthType>,
    pub auth_credentials_template: Option<String>,
    pub auth_header_name: Option<String>,
    pub data_set: Option<String>,
    /// 变量名 → 表达式，派发成功后针对 `{request, response}` 求值并写回上下文
    pub post_response_variables: BTreeMap<String, String>,
    pub multipart: bool,
    pub part_files: Vec<PathBuf>,
    pub connection_config: Option<ConnectionConfig>,
}

impl RequestTemplate {
    pub fn new(method: Method, uri_template: impl Into<String>) -> Self {
        Self {
            method,
            uri_template: uri_template.into(),
            ..Self::default()
        }
    }

    pub fn get(uri_template: impl Into<String>) -> Self {
        Self::new(Method::Get, uri_template)
    }

    pub fn post(uri_template: impl Into<String>) -> Self {
        Self::new(Method::Post, uri_template)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_lang(mut self, lang: Language) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.header_templates.insert(name.into(), template.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.parameter_templates.insert(name.into(), template.into());
        self
    }

    pub fn with_entity(mut self, template: impl Into<String>, media_type: impl Into<String>) -> Self {
        self.entity_template = Some(template.into());
        self.media_type = Some(media_type.into());
        self
    }

    /// JSON 实体模板
    pub fn with_json(self, template: impl Into<String>) -> Self {
        self.with_entity(template, "application/json")
    }

    pub fn with_auth(
        mut self,
        auth_type: AuthType,
        credentials_template: impl Into<String>,
        header_name: Option<String>,
    ) -> Self {
        self.auth_type = Some(auth_type);
        self.auth_credentials_template = Some(credentials_template.into());
        self.auth_header_name = header_name;
        self
    }

    pub fn with_data_set(mut self, data_set: impl Into<String>) -> Self {
        self.data_set = Some(data_set.into());
        self
    }

    pub fn with_post_response_variable(
        mut self,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.post_response_variables
            .insert(name.into(), expression.into());
        self
    }

    pub fn with_part_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.multipart = true;
        self.part_files.push(path.into());
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = Some(config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let template = RequestTemplate::post("http://x/$id")
            .with_key("create")
            .with_header("A", "static")
            .with_json("{}")
            .with_part_file("a.txt");

        assert_eq!(template.method, Method::Post);
        assert_eq!(template.header_templates.get("A").map(String::as_str), Some("static"));
        assert_eq!(template.media_type.as_deref(), Some("application/json"));
        assert!(template.multipart);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let template: RequestTemplate = serde_json::from_value(json!({
            "key": "list",
            "uriTemplate": "http://localhost/items",
            "headerTemplates": {"Accept": "application/json"}
        }))
        .unwrap();

        assert_eq!(template.method, Method::Get);
        assert_eq!(template.lang, Language::Script);
        assert!(template.post_response_variables.is_empty());
        assert!(!template.multipart);
    }
}
