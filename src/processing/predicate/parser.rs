//! Tokenizer and recursive-descent parser for filter expressions.

use crate::error::{StreamError, StreamResult};
use crate::types::Value;

use super::{ArithOp, CmpOp, Expr};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Cmp(CmpOp),
    Arith(ArithOp),
    Amp,
    Pipe,
    Tilde,
}

/// A token plus the byte offset it started at, for error messages.
type Spanned = (Token, usize);

/// Deepest expression tree the parser will build. Parsing and evaluation both recurse per level.
const MAX_DEPTH: usize = 256;

fn tokenize(input: &str) -> StreamResult<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
                continue;
            }
            '(' => out.push((Token::LParen, start)),
            ')' => out.push((Token::RParen, start)),
            '[' => out.push((Token::LBracket, start)),
            ']' => out.push((Token::RBracket, start)),
            ',' => out.push((Token::Comma, start)),
            '&' => out.push((Token::Amp, start)),
            '|' => out.push((Token::Pipe, start)),
            '~' => out.push((Token::Tilde, start)),
            '+' => out.push((Token::Arith(ArithOp::Add), start)),
            '-' => out.push((Token::Arith(ArithOp::Sub), start)),
            '*' => out.push((Token::Arith(ArithOp::Mul), start)),
            '/' => out.push((Token::Arith(ArithOp::Div), start)),
            '=' | '!' | '<' | '>' => {
                let next = bytes.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some(b'=')) => (CmpOp::Eq, 2),
                    ('!', Some(b'=')) => (CmpOp::Ne, 2),
                    ('<', Some(b'=')) => (CmpOp::Lte, 2),
                    ('>', Some(b'=')) => (CmpOp::Gte, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    ('=', _) => {
                        return Err(syntax_error(start, "assignment is not allowed, use '=='"));
                    }
                    _ => return Err(syntax_error(start, "unexpected '!', use 'not' or '!='")),
                };
                out.push((Token::Cmp(op), start));
                i += width;
                continue;
            }
            '\'' | '"' => {
                let (s, end) = read_quoted(input, i, c)?;
                out.push((Token::Str(s), start));
                i = end;
                continue;
            }
            '`' => {
                let (s, end) = read_quoted(input, i, '`')?;
                out.push((Token::Ident(s), start));
                i = end;
                continue;
            }
            c if c.is_ascii_digit() || (c == '.' && next_is_digit(bytes, i)) => {
                let (tok, end) = read_number(input, i)?;
                out.push((tok, start));
                i = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
                {
                    end += 1;
                }
                out.push((Token::Ident(input[i..end].to_string()), start));
                i = end;
                continue;
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or(c);
                return Err(syntax_error(start, &format!("unexpected character '{ch}'")));
            }
        }
        i += 1;
    }

    Ok(out)
}

fn next_is_digit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
}

/// Reads a quoted run starting at `open` (the quote itself). Supports backslash escapes.
fn read_quoted(input: &str, open: usize, quote: char) -> StreamResult<(String, usize)> {
    let mut out = String::new();
    let mut chars = input[open + 1..].char_indices();
    while let Some((off, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c if c == quote => return Ok((out, open + 1 + off + c.len_utf8())),
            c => out.push(c),
        }
    }
    Err(syntax_error(open, "unterminated quoted string"))
}

fn read_number(input: &str, start: usize) -> StreamResult<(Token, usize)> {
    let bytes = input.as_bytes();
    let mut end = start;
    let mut is_float = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        is_float = true;
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            is_float = true;
            end = j;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text = &input[start..end];
    let tok = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|e| syntax_error(start, &format!("invalid number '{text}': {e}")))?
    } else {
        match text.parse::<i64>() {
            Ok(v) => Token::Int(v),
            // Too large for i64; keep it as a float like pandas does.
            Err(_) => text
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|e| syntax_error(start, &format!("invalid number '{text}': {e}")))?,
        }
    };
    Ok((tok, end))
}

fn syntax_error(pos: usize, message: &str) -> StreamError {
    StreamError::predicate(format!("syntax error at offset {pos}: {message}"))
}

/// Parsed expression plus the distinct column names it references (slot order).
pub(super) struct Parsed {
    pub expr: Expr,
    pub columns: Vec<String>,
}

pub(super) fn parse(input: &str) -> StreamResult<Parsed> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(StreamError::predicate("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        columns: Vec::new(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some((tok, at)) = parser.tokens.get(parser.pos) {
        return Err(syntax_error(*at, &format!("unexpected token {tok:?}")));
    }
    Ok(Parsed {
        expr,
        columns: parser.columns,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    columns: Vec<String>,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, at)| *at).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == kw)
    }

    fn expect(&mut self, want: Token) -> StreamResult<()> {
        let at = self.offset();
        match self.advance() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(syntax_error(at, &format!("expected {want:?}, found {tok:?}"))),
            None => Err(syntax_error(at, &format!("expected {want:?}, found end of input"))),
        }
    }

    /// Count one more level of nesting. Callers reset `depth` once the nested part is parsed.
    fn descend(&mut self) -> StreamResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(StreamError::predicate(format!(
                "expression nested too deeply (limit {MAX_DEPTH})"
            )));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> StreamResult<Expr> {
        let base = self.depth;
        let mut lhs = self.parse_and()?;
        while self.peek_keyword("or") || self.peek() == Some(&Token::Pipe) {
            self.advance();
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> StreamResult<Expr> {
        let base = self.depth;
        let mut lhs = self.parse_not()?;
        while self.peek_keyword("and") || self.peek() == Some(&Token::Amp) {
            self.advance();
            self.descend()?;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_not(&mut self) -> StreamResult<Expr> {
        if self.peek_keyword("not") || self.peek() == Some(&Token::Tilde) {
            self.advance();
            self.descend()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> StreamResult<Expr> {
        let lhs = self.parse_additive()?;

        let expr = match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.advance();
                let rhs = self.parse_additive()?;
                Expr::Cmp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            Some(Token::Ident(s)) if s == "in" => {
                self.advance();
                let list = self.parse_list()?;
                Expr::In {
                    expr: Box::new(lhs),
                    list,
                    negated: false,
                }
            }
            Some(Token::Ident(s))
                if s == "not" && matches!(self.peek_at(1), Some(Token::Ident(k)) if k == "in") =>
            {
                self.advance();
                self.advance();
                let list = self.parse_list()?;
                Expr::In {
                    expr: Box::new(lhs),
                    list,
                    negated: true,
                }
            }
            _ => return Ok(lhs),
        };

        if matches!(self.peek(), Some(Token::Cmp(_))) {
            return Err(syntax_error(
                self.offset(),
                "chained comparisons are not supported; combine with 'and'",
            ));
        }
        Ok(expr)
    }

    fn parse_list(&mut self) -> StreamResult<Vec<Expr>> {
        let at = self.offset();
        let close = match self.advance() {
            Some(Token::LBracket) => Token::RBracket,
            Some(Token::LParen) => Token::RParen,
            _ => return Err(syntax_error(at, "expected a list after 'in'")),
        };
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_additive()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(t) if *t == close => {}
                _ => return Err(syntax_error(self.offset(), "expected ',' or end of list")),
            }
        }
    }

    fn parse_additive(&mut self) -> StreamResult<Expr> {
        let base = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.advance();
            self.descend()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> StreamResult<Expr> {
        let base = self.depth;
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div))) = self.peek() {
            let op = *op;
            self.advance();
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> StreamResult<Expr> {
        if self.peek() == Some(&Token::Arith(ArithOp::Sub)) {
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(match inner {
                Expr::Literal(Value::Int64(v)) => Expr::Literal(Value::Int64(-v)),
                Expr::Literal(Value::Float64(v)) => Expr::Literal(Value::Float64(-v)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> StreamResult<Expr> {
        let at = self.offset();
        match self.advance() {
            Some(Token::Int(v)) => Ok(Expr::Literal(Value::Int64(v))),
            Some(Token::Float(v)) => Ok(Expr::Literal(Value::Float64(v))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Utf8(s))),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "True" | "true" => Expr::Literal(Value::Bool(true)),
                "False" | "false" => Expr::Literal(Value::Bool(false)),
                "None" | "null" => Expr::Literal(Value::Null),
                "and" | "or" | "not" | "in" => {
                    return Err(syntax_error(at, &format!("unexpected keyword '{name}'")));
                }
                _ => Expr::Column(self.column_slot(name)),
            }),
            Some(tok) => Err(syntax_error(at, &format!("unexpected token {tok:?}"))),
            None => Err(syntax_error(at, "unexpected end of input")),
        }
    }

    fn column_slot(&mut self, name: String) -> usize {
        match self.columns.iter().position(|c| *c == name) {
            Some(slot) => slot,
            None => {
                self.columns.push(name);
                self.columns.len() - 1
            }
        }
    }
}
