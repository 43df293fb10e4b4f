use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 请求/响应体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Body {
    pub entity: Value,
    pub media_type: Option<String>,
    pub char_set: Option<String>,
    pub multipart: bool,
    pub parts: Vec<BodyPart>,
}

impl Body {
    pub fn new(entity: Value, media_type: Option<String>) -> Self {
        Self {
            entity,
            media_type,
            ..Self::default()
        }
    }

    pub fn json(entity: Value) -> Self {
        Self::new(entity, Some("application/json".to_string()))
    }

    pub fn text(text: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::new(Value::String(text.into()), Some(media_type.into()))
    }

    pub fn multipart(parts: Vec<BodyPart>) -> Self {
        Self {
            media_type: Some("multipart/form-data".to_string()),
            multipart: true,
            parts,
            ..Self::default()
        }
    }

    /// 发送用的字节：字符串实体原样发送，其他实体序列化为 JSON
    pub fn entity_bytes(&self) -> Vec<u8> {
        match &self.entity {
            Value::Null => Vec::new(),
            Value::String(text) => text.as_bytes().to_vec(),
            other => other.to_string().into_bytes(),
        }
    }

    /// 带字符集的 Content-Type
    pub fn content_type(&self) -> Option<String> {
        let media_type = self.media_type.as_deref()?;
        Some(match &self.char_set {
            Some(char_set) if !media_type.contains("charset") => {
                format!("{}; charset={}", media_type, char_set)
            }
            _ => media_type.to_string(),
        })
    }
}

/// multipart 的一个分段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyPart {
    pub name: String,
    pub file_name: Option<String>,
    pub media_type: Option<String>,
    pub char_set: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub size: u64,
    pub content: PartContent,
}

impl BodyPart {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name: name.into(),
            media_type: Some("text/plain".to_string()),
            size: text.len() as u64,
            content: PartContent::Text(text),
            ..Self::default()
        }
    }

    /// 内容是否需要在发送时从文件流式读取
    pub fn is_streamed(&self) -> bool {
        matches!(self.content, PartContent::File(_))
    }
}

/// 分段内容：内联文本/字节，或者发送时再读取的文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PartContent {
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl Default for PartContent {
    fn default() -> Self {
        PartContent::Bytes(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_bytes() {
        assert_eq!(Body::text("a=b", "text/plain").entity_bytes(), b"a=b".to_vec());
        assert_eq!(Body::json(json!({"a": 1})).entity_bytes(), b"{\"a\":1}".to_vec());
        assert!(Body::default().entity_bytes().is_empty());
    }

    #[test]
    fn test_content_type_with_charset() {
        let mut body = Body::json(json!({}));
        body.char_set = Some("utf-8".to_string());
        assert_eq!(
            body.content_type().as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_part_content_serde_shape() {
        let part = BodyPart::text("note", "hello");
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["content"], json!({"kind": "text", "value": "hello"}));
        assert!(!part.is_streamed());
    }
}
