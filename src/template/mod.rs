//! 模板解析：把 [`RequestTemplate`] 解析为具体的 [`Request`]

pub mod types;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, RuchainError};
use crate::expression::Resolver;
use crate::http::content::load_part;
use crate::http::{AuthData, Body, Request};
use crate::variable::{Context, Dataset};

pub use types::RequestTemplate;

/// 数据集记录在上下文中的绑定名
pub const RECORD_KEY: &str = "record";

/// 解析单个请求
///
/// - URI 总是交给解析器求值
/// - 请求头/参数只在包含插值标记时求值，否则原样传递
/// - 只有带请求体的方法才解析实体或加载 multipart 文件
/// - 认证凭据模板非空时求值
///
/// 任一字段求值失败都会中止这一个请求的解析。
pub fn resolve_request(
    template: &RequestTemplate,
    resolver: &dyn Resolver,
    context: &Context,
) -> Result<Request> {
    let language = resolver.language();
    let eval_quoted = |field: &str, source: &str| -> Result<String> {
        resolver
            .eval(context, &language.quote_template(source))
            .map(cast_string)
            .map_err(|e| RuchainError::template(field, e))
    };

    let uri = eval_quoted("uri", &template.uri_template)?;

    let resolve_map = |kind: &str,
                       templates: &BTreeMap<String, String>|
     -> Result<BTreeMap<String, String>> {
        templates
            .iter()
            .map(|(name, value)| -> Result<(String, String)> {
                let resolved = if language.is_dynamic(value) {
                    eval_quoted(&format!("{}.{}", kind, name), value)?
                } else {
                    value.clone()
                };
                Ok((name.clone(), resolved))
            })
            .collect()
    };

    let headers = resolve_map("header", &template.header_templates)?;
    let parameters = resolve_map("parameter", &template.parameter_templates)?;

    let body = if template.method.is_bodied() {
        Some(resolve_body(template, resolver, context)?)
    } else {
        None
    };

    let auth_data = match template.auth_credentials_template.as_deref() {
        Some(credentials) if !credentials.trim().is_empty() => {
            let credentials = resolver
                .eval(context, credentials)
                .map(cast_string)
                .map_err(|e| RuchainError::template("authCredentials", e))?;
            let mut data = AuthData::new(credentials);
            if let Some(header_name) = &template.auth_header_name {
                data = data.with_header_name(header_name.clone());
            }
            Some(data)
        }
        _ => None,
    };

    Ok(Request {
        uri,
        method: template.method,
        headers,
        parameters,
        body,
        auth_type: template.auth_type,
        auth_data,
        data_set: template.data_set.clone(),
        data_set_record_id: None,
        data_set_record: None,
        connection_config: template.connection_config.unwrap_or_default(),
    })
}

fn resolve_body(
    template: &RequestTemplate,
    resolver: &dyn Resolver,
    context: &Context,
) -> Result<Body> {
    if template.multipart {
        let parts = template
            .part_files
            .iter()
            .map(|path| load_part(path))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Body::multipart(parts));
    }

    // 实体模板按脚本原样求值，不做引号包装
    let entity = match template.entity_template.as_deref() {
        Some(source) if !source.trim().is_empty() => resolver
            .eval(context, source)
            .map_err(|e| RuchainError::template("entity", e))?,
        _ => Value::Null,
    };

    Ok(Body::new(entity, template.media_type.clone()))
}

/// 按数据集展开解析
///
/// 数据集有记录时每条记录解析一次（记录绑定到 `record`，字段同时平铺进上下文），
/// 否则只解析一次。
pub fn resolve_requests(
    template: &RequestTemplate,
    resolver: &dyn Resolver,
    context: &Context,
    dataset: Option<&Dataset>,
) -> Result<Vec<Request>> {
    let records = match dataset {
        Some(dataset) if !dataset.records.is_empty() => &dataset.records,
        _ => return Ok(vec![resolve_request(template, resolver, context)?]),
    };

    let data_set = template
        .data_set
        .clone()
        .or_else(|| dataset.map(|d| d.id.clone()));

    records
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<Request> {
            let mut record_context = context.clone();
            record_context.extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
            record_context.insert(RECORD_KEY, Value::Object(record.clone()));

            let mut request = resolve_request(template, resolver, &record_context)?;
            request.data_set = data_set.clone();
            request.data_set_record_id = Some(index);
            request.data_set_record = Some(record.clone());
            Ok(request)
        })
        .collect()
}

/// 求值结果转为字符串：字符串原样返回，null 为空串，其他值取 JSON 文本
pub fn cast_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
