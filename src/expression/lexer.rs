use std::sync::OnceLock;

use regex::Regex;
use serde_json::Number;

use crate::expression::ResolveError;

/// 插值字符串中的片段
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    /// 普通文本
    Text(String),
    /// `${expr}` 或 `$name.path` 中的表达式源码，以及它在原文中的偏移
    Expr { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Number),
    /// 单引号字符串，不做插值
    Str(String),
    /// 双引号 / 三引号字符串，支持插值
    Template(Vec<StrPart>),
    Ident(String),
    True,
    False,
    Null,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Assign,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// 语句分隔符：`;` 或者括号外的换行
    Separator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    depth: usize,
    base: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self::with_offset(src, 0)
    }

    /// `base` 用于嵌套插值表达式，保证报错位置指向原始模板
    pub fn with_offset(src: &'a str, base: usize) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            index: 0,
            depth: 0,
            base,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ResolveError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(i, _)| *i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        Some(c)
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> ResolveError {
        ResolveError::Syntax {
            position: self.base + pos,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Token, ResolveError> {
        // 跳过空白；换行只在括号外才是语句分隔符
        while let Some(c) = self.peek() {
            if c == '\n' && self.depth == 0 {
                break;
            }
            if c.is_whitespace() {
                self.index += 1;
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.index += 1;
                }
            } else {
                break;
            }
        }

        let pos = self.offset();
        let absolute = self.base + pos;
        let token = move |kind| Token {
            kind,
            pos: absolute,
        };

        let Some(c) = self.bump() else {
            return Ok(token(TokenKind::Eof));
        };

        let kind = match c {
            '\n' | ';' => TokenKind::Separator,
            '(' => {
                self.depth += 1;
                TokenKind::LParen
            }
            '[' => {
                self.depth += 1;
                TokenKind::LBracket
            }
            '{' => {
                self.depth += 1;
                TokenKind::LBrace
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RParen
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '=' if self.peek() == Some('=') => {
                self.index += 1;
                TokenKind::Eq
            }
            '=' => TokenKind::Assign,
            '!' if self.peek() == Some('=') => {
                self.index += 1;
                TokenKind::Ne
            }
            '!' => TokenKind::Not,
            '>' if self.peek() == Some('=') => {
                self.index += 1;
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            '<' if self.peek() == Some('=') => {
                self.index += 1;
                TokenKind::Le
            }
            '<' => TokenKind::Lt,
            '&' if self.peek() == Some('&') => {
                self.index += 1;
                TokenKind::And
            }
            '|' if self.peek() == Some('|') => {
                self.index += 1;
                TokenKind::Or
            }
            '\'' => TokenKind::Str(self.single_quoted(pos)?),
            '"' if self.peek() == Some('"') && self.peek_at(1) == Some('"') => {
                self.index += 2;
                TokenKind::Template(self.template_string(pos, true)?)
            }
            '"' => TokenKind::Template(self.template_string(pos, false)?),
            c if c.is_ascii_digit() => TokenKind::Number(self.number(pos)?),
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        self.index += 1;
                    } else {
                        break;
                    }
                }
                let ident = &self.src[start..self.offset()];
                match ident {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(ident.to_string()),
                }
            }
            other => return Err(self.error(pos, format!("Unexpected character '{}'", other))),
        };

        Ok(token(kind))
    }

    fn number(&mut self, start: usize) -> Result<Number, ResolveError> {
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.index += 1;
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                self.index += 1;
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                is_float = true;
                self.index += 2;
            } else {
                break;
            }
        }

        let text = &self.src[start..self.offset()];
        if !is_float && let Ok(n) = text.parse::<i64>() {
            return Ok(Number::from(n));
        }

        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| self.error(start, format!("Invalid number '{}'", text)))
    }

    fn single_quoted(&mut self, start: usize) -> Result<String, ResolveError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start, "Unterminated string")),
                Some('\'') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err(self.error(start, "Unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn at_triple_quote(&self) -> bool {
        self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"')
    }

    fn template_string(&mut self, start: usize, triple: bool) -> Result<Vec<StrPart>, ResolveError> {
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            if triple && self.at_triple_quote() {
                self.index += 3;
                break;
            }

            let Some(c) = self.bump() else {
                return Err(self.error(start, "Unterminated string"));
            };

            match c {
                '"' if !triple => break,
                '\n' if !triple => return Err(self.error(start, "Newline in single-line string")),
                '\\' => match self.bump() {
                    Some('n') if !triple => text.push('\n'),
                    Some('t') if !triple => text.push('\t'),
                    Some('r') if !triple => text.push('\r'),
                    Some(c @ ('$' | '"' | '\\')) => text.push(c),
                    Some(c) if triple => {
                        text.push('\\');
                        text.push(c);
                    }
                    Some(c) => text.push(c),
                    None => return Err(self.error(start, "Unterminated string")),
                },
                '$' if self.peek() == Some('{') => {
                    self.index += 1;
                    if !text.is_empty() {
                        parts.push(StrPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(self.braced_expression(start)?);
                }
                '$' if self.peek().is_some_and(|n| n.is_alphabetic() || n == '_') => {
                    if !text.is_empty() {
                        parts.push(StrPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(self.short_path());
                }
                other => text.push(other),
            }
        }

        if !text.is_empty() || parts.is_empty() {
            parts.push(StrPart::Text(text));
        }
        Ok(parts)
    }

    /// `${ ... }`：按花括号深度找到匹配的 `}`，跳过其中的字符串字面量
    fn braced_expression(&mut self, start: usize) -> Result<StrPart, ResolveError> {
        let expr_start = self.offset();
        let mut depth = 1usize;
        let mut quote: Option<char> = None;

        while let Some(c) = self.bump() {
            match quote {
                Some(q) => {
                    if c == '\\' {
                        self.index += 1;
                    } else if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            let end = self.chars[self.index - 1].0;
                            return Ok(StrPart::Expr {
                                source: self.src[expr_start..end].to_string(),
                                offset: self.base + expr_start,
                            });
                        }
                    }
                    _ => {}
                },
            }
        }

        Err(self.error(start, "Unterminated ${...} expression"))
    }

    /// `$name.path`：只匹配标识符和点号
    fn short_path(&mut self) -> StrPart {
        static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = PATH_REGEX.get_or_init(|| {
            Regex::new(r"^[\p{L}_][\p{L}\p{N}_]*(?:\.[\p{L}_][\p{L}\p{N}_]*)*").unwrap()
        });

        let start = self.offset();
        let matched = re
            .find(&self.src[start..])
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        self.index += matched.chars().count();

        StrPart::Expr {
            source: matched,
            offset: self.base + start,
        }
    }
}
