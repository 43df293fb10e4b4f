//! 文件内容辅助：按扩展名识别媒体类型，小文本文件读入内存，其余文件发送时流式读取

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::http::body::{BodyPart, PartContent};
use crate::{Result, RuchainError};

/// 超过该大小的文件不读入内存
pub const IN_MEMORY_THRESHOLD: u64 = 1024 * 1024;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

static MEDIA_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("txt", "text/plain"),
        ("log", "text/plain"),
        ("csv", "text/csv"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("css", "text/css"),
        ("md", "text/markdown"),
        ("js", "text/javascript"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("xhtml", "application/xhtml+xml"),
        ("svg", "image/svg+xml"),
        ("yaml", "application/yaml"),
        ("yml", "application/yaml"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
    ])
});

/// 按扩展名识别媒体类型
pub fn media_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| MEDIA_TYPES.get(ext.as_str()).copied())
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}

/// `text/*` 以及 JSON / XML / XHTML / SVG 视为文本
pub fn is_text(media_type: &str) -> bool {
    let media_type = media_type.to_ascii_lowercase();
    media_type.starts_with("text/")
        || media_type.contains("json")
        || media_type.contains("xml")
        || media_type.contains("xhtml")
        || media_type.contains("svg")
}

/// 把文件加载为 multipart 分段
pub fn load_part(path: &Path) -> Result<BodyPart> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RuchainError::Content(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(RuchainError::Content(format!(
            "{} 不是文件",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let media_type = media_type_for(path);
    let size = metadata.len();

    let content = if is_text(media_type) && size <= IN_MEMORY_THRESHOLD {
        let bytes = std::fs::read(path)
            .map_err(|e| RuchainError::Content(format!("{}: {}", path.display(), e)))?;
        // 非 UTF-8 文本按原始字节发送
        match String::from_utf8(bytes) {
            Ok(text) => PartContent::Text(text),
            Err(e) => PartContent::Bytes(e.into_bytes()),
        }
    } else {
        PartContent::File(path.to_path_buf())
    };

    tracing::debug!(file = %path.display(), media_type, size, "Loaded part file");

    Ok(BodyPart {
        name: file_name.clone(),
        file_name: Some(file_name),
        media_type: Some(media_type.to_string()),
        char_set: matches!(content, PartContent::Text(_)).then(|| "utf-8".to_string()),
        headers: Default::default(),
        size,
        content,
    })
}
