use std::fmt;

use serde_json::Value;

use crate::expression::ResolveError;
use crate::expression::lexer::{Lexer, StrPart, Token, TokenKind};

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,          // ==
    NotEqual,       // !=
    Greater,        // >
    Less,           // <
    GreaterOrEqual, // >=
    LessOrEqual,    // <=
    Contains,       // contains
    And,            // &&
    Or,             // ||
    Add,            // +
    Subtract,       // -
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
            Self::And => "&&",
            Self::Or => "||",
            Self::Add => "+",
            Self::Subtract => "-",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// 插值字符串片段
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

/// 表达式
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Template(Vec<TemplatePart>),
    Variable(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    /// 存在性检查: path exists
    Exists(Box<Expr>),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign(String, Expr),
    Expr(Expr),
}

/// 解析后的脚本：按顺序执行的语句
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// 解析脚本或模板表达式
///
/// 支持的格式：
/// - `response.status == 200`
/// - `response.headers["content-type"] contains "json"`
/// - `response.body.entity.token exists`
/// - `"""http://host/$id"""`
/// - `token = login.body.entity.token; count = len(items)`
pub fn parse_program(input: &str) -> Result<Program, ResolveError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, index: 0 };
    parser.program()
}

/// 解析单个表达式（插值 `${...}` 内部使用）
fn parse_expression_at(input: &str, offset: usize) -> Result<Expr, ResolveError> {
    let tokens = Lexer::with_offset(input, offset).tokenize()?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.index.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.index + ahead).min(self.tokens.len() - 1)].kind
    }

    fn pos(&self) -> usize {
        self.tokens[self.index.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ResolveError {
        ResolveError::Syntax {
            position: self.pos(),
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ResolveError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {}, found {:?}", what, self.peek())))
        }
    }

    fn expect_end(&mut self) -> Result<(), ResolveError> {
        while self.eat(&TokenKind::Separator) {}
        if *self.peek() == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error(format!("Unexpected token {:?}", self.peek())))
        }
    }

    fn program(&mut self) -> Result<Program, ResolveError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Separator) {}
            if *self.peek() == TokenKind::Eof {
                break;
            }
            statements.push(self.statement()?);
            match self.peek() {
                TokenKind::Separator | TokenKind::Eof => {}
                other => return Err(self.error(format!("Unexpected token {:?}", other))),
            }
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement, ResolveError> {
        if let TokenKind::Ident(name) = self.peek().clone()
            && *self.peek_at(1) == TokenKind::Assign
        {
            self.advance();
            self.advance();
            let value = self.expression()?;
            return Ok(Statement::Assign(name, value));
        }
        Ok(Statement::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ResolveError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ResolveError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = Expr::Binary(Box::new(left), BinaryOp::Or, Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ResolveError> {
        let mut left = self.comparison()?;
        while self.eat(&TokenKind::And) {
            let right = self.comparison()?;
            left = Expr::Binary(Box::new(left), BinaryOp::And, Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ResolveError> {
        let left = self.additive()?;

        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Equal,
            TokenKind::Ne => BinaryOp::NotEqual,
            TokenKind::Gt => BinaryOp::Greater,
            TokenKind::Lt => BinaryOp::Less,
            TokenKind::Ge => BinaryOp::GreaterOrEqual,
            TokenKind::Le => BinaryOp::LessOrEqual,
            TokenKind::Ident(word) if word == "contains" => BinaryOp::Contains,
            TokenKind::Ident(word) if word == "exists" => {
                self.advance();
                return Ok(Expr::Exists(Box::new(left)));
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.additive()?;
        Ok(Expr::Binary(Box::new(left), op, Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ResolveError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ResolveError> {
        if self.eat(&TokenKind::Not) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&TokenKind::Minus) {
            return Ok(Expr::Unary(UnaryOp::Negate, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ResolveError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    expr = match self.advance() {
                        TokenKind::Ident(name) => Expr::Member(Box::new(expr), name),
                        TokenKind::Number(n) => {
                            Expr::Index(Box::new(expr), Box::new(Expr::Literal(Value::Number(n))))
                        }
                        TokenKind::True => Expr::Member(Box::new(expr), "true".to_string()),
                        TokenKind::False => Expr::Member(Box::new(expr), "false".to_string()),
                        TokenKind::Null => Expr::Member(Box::new(expr), "null".to_string()),
                        other => {
                            return Err(self.error(format!(
                                "Expected member name after '.', found {:?}",
                                other
                            )));
                        }
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ResolveError> {
        let pos = self.pos();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Template(parts) => template(parts),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.list(TokenKind::RParen, "')'")?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                // `[:]` 兼容写法：空对象
                if *self.peek() == TokenKind::Colon && *self.peek_at(1) == TokenKind::RBracket {
                    self.advance();
                    self.advance();
                    return Ok(Expr::Object(Vec::new()));
                }
                Ok(Expr::Array(self.list(TokenKind::RBracket, "']'")?))
            }
            TokenKind::LBrace => self.object(),
            other => Err(ResolveError::Syntax {
                position: pos,
                message: format!("Unexpected token {:?}", other),
            }),
        }
    }

    fn list(&mut self, close: TokenKind, what: &str) -> Result<Vec<Expr>, ResolveError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&TokenKind::Comma) {
                if self.eat(&close) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }

    fn object(&mut self) -> Result<Expr, ResolveError> {
        let mut fields = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.advance() {
                TokenKind::Ident(name) => name,
                TokenKind::Str(s) => s,
                TokenKind::Number(n) => n.to_string(),
                TokenKind::Template(parts) => match parts.as_slice() {
                    [StrPart::Text(text)] => text.clone(),
                    _ => return Err(self.error("Object keys cannot be interpolated")),
                },
                other => return Err(self.error(format!("Expected object key, found {:?}", other))),
            };
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.expression()?;
            fields.push((key, value));

            if self.eat(&TokenKind::Comma) {
                if self.eat(&TokenKind::RBrace) {
                    return Ok(Expr::Object(fields));
                }
                continue;
            }
            self.expect(TokenKind::RBrace, "'}'")?;
            return Ok(Expr::Object(fields));
        }
    }
}

fn template(parts: Vec<StrPart>) -> Result<Expr, ResolveError> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            StrPart::Text(text) => out.push(TemplatePart::Text(text)),
            StrPart::Expr { source, offset } => {
                if source.trim().is_empty() {
                    return Err(ResolveError::Syntax {
                        position: offset,
                        message: "Empty interpolation".to_string(),
                    });
                }
                out.push(TemplatePart::Expr(parse_expression_at(&source, offset)?));
            }
        }
    }

    // 只有纯文本时直接折叠为字面量
    if let [TemplatePart::Text(text)] = out.as_slice() {
        return Ok(Expr::Literal(Value::String(text.clone())));
    }
    Ok(Expr::Template(out))
}
