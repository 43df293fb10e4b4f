use serde_json::{Map, Number, Value};

use crate::expression::ResolveError;
use crate::expression::ScriptDispatch;
use crate::expression::parser::{BinaryOp, Expr, Program, Statement, TemplatePart, UnaryOp};
use crate::http::Request;
use crate::variable::Context;

type EvalResult = Result<Value, ResolveError>;

/// 对解析后的程序求值
///
/// 读取 `base` 上下文，赋值只写入局部绑定；由调用方决定是否把局部绑定合并回上下文。
pub struct Evaluator<'a> {
    base: &'a Context,
    locals: Map<String, Value>,
    dispatcher: Option<&'a dyn ScriptDispatch>,
}

impl<'a> Evaluator<'a> {
    pub fn new(base: &'a Context, dispatcher: Option<&'a dyn ScriptDispatch>) -> Self {
        Self {
            base,
            locals: Map::new(),
            dispatcher,
        }
    }

    /// 依次执行语句，返回最后一条语句的值
    pub fn run(&mut self, program: &Program) -> EvalResult {
        let mut last = Value::Null;
        for statement in &program.statements {
            last = match statement {
                Statement::Assign(name, expr) => {
                    let value = self.eval(expr)?;
                    self.locals.insert(name.clone(), value.clone());
                    value
                }
                Statement::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    pub fn into_locals(self) -> Map<String, Value> {
        self.locals
    }

    fn variable(&self, name: &str) -> EvalResult {
        self.locals
            .get(name)
            .or_else(|| self.base.get(name))
            .cloned()
            .ok_or_else(|| ResolveError::UndefinedVariable(name.to_string()))
    }

    fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&display(&self.eval(expr)?)),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Variable(name) => self.variable(name),
            Expr::Member(target, name) => Ok(member(&self.eval(target)?, name)),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(element(&target, &index))
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Negate => match &value {
                        Value::Number(n) => Ok(match n.as_i64().and_then(i64::checked_neg) {
                            Some(i) => Value::from(i),
                            None => number(-to_f64(n)),
                        }),
                        other => Err(mismatch("number", other)),
                    },
                }
            }
            Expr::Binary(left, op, right) => self.binary(left, *op, right),
            Expr::Exists(target) => match self.eval(target) {
                Ok(Value::Null) | Err(ResolveError::UndefinedVariable(_)) => Ok(Value::Bool(false)),
                Ok(_) => Ok(Value::Bool(true)),
                Err(e) => Err(e),
            },
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        }
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr) -> EvalResult {
        // 逻辑运算短路
        match op {
            BinaryOp::And => {
                let result = truthy(&self.eval(left)?) && truthy(&self.eval(right)?);
                return Ok(Value::Bool(result));
            }
            BinaryOp::Or => {
                let result = truthy(&self.eval(left)?) || truthy(&self.eval(right)?);
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        let left = self.eval(left)?;
        let right = self.eval(right)?;

        match op {
            BinaryOp::Add => add(left, right),
            BinaryOp::Subtract => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                    (Some(x), Some(y)) if x.checked_sub(y).is_some() => Ok(Value::from(x - y)),
                    _ => Ok(number(to_f64(a) - to_f64(b))),
                },
                (Value::Number(_), other) | (other, _) => Err(mismatch("number", other)),
            },
            _ => compare(op, &left, &right).map(Value::Bool),
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> EvalResult {
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ResolveError::Evaluation(format!(
                    "{}() expects {} argument(s), got {}",
                    name,
                    expected,
                    args.len()
                )))
            }
        };

        match name {
            "json" => {
                arity(1)?;
                serde_json::to_string(&args[0])
                    .map(Value::String)
                    .map_err(|e| ResolveError::Evaluation(e.to_string()))
            }
            "fromJson" => {
                arity(1)?;
                match &args[0] {
                    Value::String(text) => serde_json::from_str(text)
                        .map_err(|e| ResolveError::Evaluation(format!("fromJson: {}", e))),
                    other => Err(mismatch("string", other)),
                }
            }
            "len" => {
                arity(1)?;
                match &args[0] {
                    Value::String(s) => Ok(Value::from(s.chars().count())),
                    Value::Array(items) => Ok(Value::from(items.len())),
                    Value::Object(map) => Ok(Value::from(map.len())),
                    Value::Null => Ok(Value::from(0)),
                    other => Err(mismatch("string, array or object", other)),
                }
            }
            "str" => {
                arity(1)?;
                Ok(Value::String(display(&args[0])))
            }
            "http" => {
                arity(1)?;
                let dispatcher = self.dispatcher.ok_or_else(|| {
                    ResolveError::Dispatch("no request dispatcher available".to_string())
                })?;
                let request: Request = serde_json::from_value(args[0].clone())
                    .map_err(|e| ResolveError::Dispatch(format!("invalid request: {}", e)))?;
                let response = dispatcher.dispatch(request);
                serde_json::to_value(&response).map_err(|e| ResolveError::Dispatch(e.to_string()))
            }
            other => Err(ResolveError::UnknownFunction(other.to_string())),
        }
    }
}

/// 值的 "真假"：null、false、0、空字符串、空数组、空对象为假
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => to_f64(n) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// 插值时的字符串形式：字符串原样输出，其他值输出 JSON
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &str, actual: &Value) -> ResolveError {
    ResolveError::TypeMismatch {
        expected: expected.to_string(),
        actual: type_name(actual).to_string(),
    }
}

fn to_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn member(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn element(target: &Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize).cloned())
            .unwrap_or(Value::Null),
        (_, Value::String(key)) => member(target, key),
        _ => Value::Null,
    }
}

fn add(left: Value, right: Value) -> EvalResult {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) if x.checked_add(y).is_some() => Ok(Value::from(x + y)),
            _ => Ok(number(to_f64(&a) + to_f64(&b))),
        },
        (Value::String(a), b) => Ok(Value::String(a + &display(&b))),
        (a, Value::String(b)) => Ok(Value::String(display(&a) + &b)),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Array(mut a), b) => {
            a.push(b);
            Ok(Value::Array(a))
        }
        (Value::Object(mut a), Value::Object(b)) => {
            a.extend(b);
            Ok(Value::Object(a))
        }
        (a, _) => Err(mismatch("number, string or array", &a)),
    }
}

/// 数字按数值比较，其他类型结构相等
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => (to_f64(a) - to_f64(b)).abs() < f64::EPSILON,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

/// 比较两个值
fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, ResolveError> {
    match op {
        BinaryOp::Equal => return Ok(values_equal(left, right)),
        BinaryOp::NotEqual => return Ok(!values_equal(left, right)),
        BinaryOp::Contains => {
            return match (left, right) {
                (Value::String(a), Value::String(b)) => Ok(a.contains(b.as_str())),
                (Value::Array(items), needle) => Ok(items.iter().any(|i| values_equal(i, needle))),
                (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
                (Value::String(_), other) => Err(mismatch("string", other)),
                (other, _) => Err(mismatch("string, array or object", other)),
            };
        }
        _ => {}
    }

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => to_f64(a).partial_cmp(&to_f64(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Null, _) | (_, Value::Null) => {
            return Err(ResolveError::InvalidOperator(format!(
                "Operator {} not supported for null comparison",
                op
            )));
        }
        (Value::Bool(_), Value::Bool(_)) => {
            return Err(ResolveError::InvalidOperator(format!(
                "Operator {} not supported for boolean values",
                op
            )));
        }
        (Value::Number(_), other) => return Err(mismatch("number", other)),
        (other, _) => return Err(mismatch("number", other)),
    };

    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match op {
        BinaryOp::Greater => ordering.is_gt(),
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::GreaterOrEqual => ordering.is_ge(),
        BinaryOp::LessOrEqual => ordering.is_le(),
        other => {
            return Err(ResolveError::InvalidOperator(format!(
                "Unexpected comparison operator {}",
                other
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse_program;
    use serde_json::json;

    fn eval_with(context: &Context, src: &str) -> EvalResult {
        let program = parse_program(src)?;
        Evaluator::new(context, None).run(&program)
    }

    fn eval(src: &str) -> EvalResult {
        let context = Context::new()
            .with(
                "response",
                json!({
                    "status": 200,
                    "headers": {"content-type": "application/json"},
                    "body": {"entity": {"id": 42, "name": "test", "tags": ["a", "b"]}}
                }),
            )
            .with("id", 42);
        eval_with(&context, src)
    }

    #[test]
    fn test_evaluate_status() {
        assert_eq!(eval("response.status == 200").unwrap(), json!(true));
        assert_eq!(eval("response.status != 200").unwrap(), json!(false));
        assert_eq!(eval("response.status >= 200 && response.status < 300").unwrap(), json!(true));
    }

    #[test]
    fn test_evaluate_header_contains() {
        assert_eq!(
            eval("response.headers[\"content-type\"] contains 'json'").unwrap(),
            json!(true)
        );
        assert_eq!(eval("response.body.entity.tags contains 'b'").unwrap(), json!(true));
        assert_eq!(eval("response.body.entity contains 'id'").unwrap(), json!(true));
    }

    #[test]
    fn test_evaluate_exists() {
        assert_eq!(eval("response.body.entity.name exists").unwrap(), json!(true));
        assert_eq!(eval("response.body.entity.token exists").unwrap(), json!(false));
        assert_eq!(eval("nobody exists").unwrap(), json!(false));
    }

    #[test]
    fn test_missing_nested_field_is_null() {
        assert_eq!(eval("response.body.missing.deeper").unwrap(), Value::Null);
        assert_eq!(eval("response.body.entity.tags[5]").unwrap(), Value::Null);
    }

    #[test]
    fn test_undefined_root_variable() {
        assert_eq!(
            eval("missing.status").unwrap_err(),
            ResolveError::UndefinedVariable("missing".to_string())
        );
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(eval("id + 1").unwrap(), json!(43));
        assert_eq!(eval("id - 50").unwrap(), json!(-8));
        assert_eq!(eval("1.5 + 1").unwrap(), json!(2.5));
        assert_eq!(eval("'id-' + id").unwrap(), json!("id-42"));
        assert_eq!(eval("[1] + [2, 3]").unwrap(), json!([1, 2, 3]));
        assert_eq!(eval("-id").unwrap(), json!(-42));
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            eval("\"/items/$id?name=${response.body.entity.name}\"").unwrap(),
            json!("/items/42?name=test")
        );
        assert_eq!(
            eval("\"\"\"${ {a: id} }\"\"\"").unwrap(),
            json!("{\"a\":42}")
        );
    }

    #[test]
    fn test_type_mismatch_and_invalid_operator() {
        assert!(matches!(
            eval("response.status > 'abc'"),
            Err(ResolveError::TypeMismatch { .. })
        ));
        assert!(matches!(
            eval("true > false"),
            Err(ResolveError::InvalidOperator(_))
        ));
        assert!(matches!(
            eval("null < 1"),
            Err(ResolveError::InvalidOperator(_))
        ));
        assert_eq!(eval("1 == '1'").unwrap(), json!(false));
        assert_eq!(eval("null == null").unwrap(), json!(true));
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(eval("!''").unwrap(), json!(true));
        assert_eq!(eval("0 || 'x'").unwrap(), json!(true));
        assert_eq!(eval("[] && true").unwrap(), json!(false));
    }

    #[test]
    fn test_builtin_functions() {
        assert_eq!(eval("json({a: 1})").unwrap(), json!("{\"a\":1}"));
        assert_eq!(eval("fromJson('{\"a\": [1, 2]}').a[1]").unwrap(), json!(2));
        assert_eq!(eval("len(response.body.entity.tags)").unwrap(), json!(2));
        assert_eq!(eval("str(id)").unwrap(), json!("42"));
        assert_eq!(
            eval("nope(1)").unwrap_err(),
            ResolveError::UnknownFunction("nope".to_string())
        );
        assert!(matches!(eval("len()"), Err(ResolveError::Evaluation(_))));
        assert!(matches!(
            eval("http({uri: 'http://localhost'})"),
            Err(ResolveError::Dispatch(_))
        ));
    }

    #[test]
    fn test_statements_and_locals() {
        let context = Context::new().with("base", 10);
        let program = parse_program("x = base + 1; y = x + 1\ny").unwrap();
        let mut evaluator = Evaluator::new(&context, None);
        assert_eq!(evaluator.run(&program).unwrap(), json!(12));

        let locals = evaluator.into_locals();
        assert_eq!(locals.get("x"), Some(&json!(11)));
        assert_eq!(locals.get("y"), Some(&json!(12)));
    }
}
