//! A small front end for C-style assertion conditions, used by the CLI and
//! the test suite. It produces the same typed trees a toolchain binding
//! would: implicit promotions appear as `Convert`, explicit casts as
//! `Cast`, and member access or subscripts fold into opaque leaves that
//! keep their source spelling.

use std::collections::BTreeMap;

use tracing::trace;

use crate::ast::{BinOp, Expr, ExprKind};
use crate::dsl;
use crate::error::{IntrospectError, IntrospectResult};
use crate::types::{CType, IntWidth};

/// Declared names visible to a condition: variable types and function
/// return types. Anything outside it is a type error at parse time.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    vars: BTreeMap<String, CType>,
    funcs: BTreeMap<String, CType>,
    opaques: BTreeMap<String, CType>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_var(mut self, name: impl Into<String>, ty: CType) -> Self {
        self.vars.insert(name.into(), ty);
        self
    }

    pub fn declare_fn(mut self, name: impl Into<String>, ret: CType) -> Self {
        self.funcs.insert(name.into(), ret);
        self
    }

    /// Declares the type of an unmodelled lvalue such as `c.b.a` so its
    /// uses classify with the right width.
    pub fn declare_opaque(mut self, text: impl Into<String>, ty: CType) -> Self {
        self.opaques.insert(text.into(), ty);
        self
    }

    fn var_type(&self, name: &str) -> IntrospectResult<CType> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| IntrospectError::type_error(format!("undeclared variable '{name}'")))
    }

    fn fn_type(&self, name: &str) -> IntrospectResult<CType> {
        self.funcs
            .get(name)
            .cloned()
            .ok_or_else(|| IntrospectError::type_error(format!("undeclared function '{name}'")))
    }

    fn opaque_type(&self, text: &str) -> CType {
        self.opaques.get(text).cloned().unwrap_or_else(CType::int)
    }
}

/// Parses one condition against `scope`, with C's operator precedence.
pub fn parse_condition(input: &str, scope: &Scope) -> IntrospectResult<Expr> {
    let tokens = lex(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
        scope,
    };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => {
            trace!(%input, "parsed assertion condition");
            Ok(expr)
        }
        Some(t) => Err(IntrospectError::parse(format!(
            "unexpected trailing input at byte {}",
            t.start
        ))),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Int(i128),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Arrow,
    Amp,
    AmpAmp,
    PipePipe,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

fn lex(input: &str) -> IntrospectResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                Tok::LParen
            }
            b')' => {
                i += 1;
                Tok::RParen
            }
            b'[' => {
                i += 1;
                Tok::LBracket
            }
            b']' => {
                i += 1;
                Tok::RBracket
            }
            b',' => {
                i += 1;
                Tok::Comma
            }
            b'.' => {
                i += 1;
                Tok::Dot
            }
            b'+' => {
                i += 1;
                Tok::Plus
            }
            b'*' => {
                i += 1;
                Tok::Star
            }
            b'/' => {
                i += 1;
                Tok::Slash
            }
            b'%' => {
                i += 1;
                Tok::Percent
            }
            b'-' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    i += 2;
                    Tok::Arrow
                } else {
                    i += 1;
                    Tok::Minus
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    i += 2;
                    Tok::AmpAmp
                } else {
                    i += 1;
                    Tok::Amp
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    i += 2;
                    Tok::PipePipe
                } else {
                    return Err(IntrospectError::parse(format!(
                        "bitwise '|' is not a supported assertion operator (byte {i})"
                    )));
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::EqEq
                } else {
                    return Err(IntrospectError::parse(format!(
                        "assignment inside an assertion condition (byte {i})"
                    )));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::NotEq
                } else {
                    return Err(IntrospectError::parse(format!(
                        "unary '!' is not supported (byte {i})"
                    )));
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::Le
                } else {
                    i += 1;
                    Tok::Lt
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::Ge
                } else {
                    i += 1;
                    Tok::Gt
                }
            }
            b'"' => {
                i += 1;
                let lit_start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i == bytes.len() {
                    return Err(IntrospectError::parse("unterminated string literal"));
                }
                let text = input[lit_start..i].to_string();
                i += 1;
                Tok::Str(text)
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                let value: i128 = text
                    .parse()
                    .map_err(|_| IntrospectError::parse(format!("integer literal '{text}' out of range")))?;
                Tok::Int(value)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                Tok::Ident(input[start..i].to_string())
            }
            other => {
                return Err(IntrospectError::parse(format!(
                    "unexpected character '{}' at byte {start}",
                    other as char
                )))
            }
        };
        out.push(Token { tok, start, end: i });
    }
    Ok(out)
}

const TYPE_KEYWORDS: &[&str] = &["char", "short", "int", "long", "signed", "unsigned", "void"];

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a Scope,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek().map(|t| &t.tok) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> IntrospectResult<Token> {
        match self.bump() {
            Some(t) if t.tok == tok => Ok(t),
            Some(t) => Err(IntrospectError::parse(format!(
                "expected {what} at byte {}",
                t.start
            ))),
            None => Err(IntrospectError::parse(format!(
                "expected {what}, found end of input"
            ))),
        }
    }

    fn or_expr(&mut self) -> IntrospectResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&Tok::PipePipe) {
            let right = self.and_expr()?;
            left = dsl::or(left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> IntrospectResult<Expr> {
        let mut left = self.comparison()?;
        while self.eat(&Tok::AmpAmp) {
            let right = self.comparison()?;
            left = dsl::and(left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> IntrospectResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::EqEq) => BinOp::Eq,
                Some(Tok::NotEq) => BinOp::Ne,
                Some(Tok::Lt) => BinOp::Lt,
                Some(Tok::Le) => BinOp::Le,
                Some(Tok::Gt) => BinOp::Gt,
                Some(Tok::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = dsl::binary(op, left, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> IntrospectResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = dsl::binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> IntrospectResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = dsl::binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> IntrospectResult<Expr> {
        if self.eat(&Tok::Amp) {
            let operand = self.unary()?;
            return match &operand.kind {
                ExprKind::Var { .. } | ExprKind::Opaque { .. } => Ok(dsl::addr_of(operand)),
                _ => Err(IntrospectError::parse(
                    "address-of requires a named lvalue",
                )),
            };
        }
        if self.at_cast() {
            self.expect(Tok::LParen, "'('")?;
            let ty = self.type_name()?;
            self.expect(Tok::RParen, "')' after type name")?;
            let inner = self.unary()?;
            return Ok(dsl::cast(ty, inner));
        }
        self.postfix()
    }

    /// A '(' opens a cast only when a type keyword follows.
    fn at_cast(&self) -> bool {
        if self.peek().map(|t| &t.tok) != Some(&Tok::LParen) {
            return false;
        }
        matches!(
            self.peek_at(1).map(|t| &t.tok),
            Some(Tok::Ident(name)) if TYPE_KEYWORDS.contains(&name.as_str())
        )
    }

    fn type_name(&mut self) -> IntrospectResult<CType> {
        let mut words = Vec::new();
        while let Some(Tok::Ident(name)) = self.peek().map(|t| &t.tok) {
            if !TYPE_KEYWORDS.contains(&name.as_str()) {
                break;
            }
            words.push(name.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(IntrospectError::parse("expected a type name"));
        }

        let unsigned = words.iter().any(|w| w == "unsigned");
        let longs = words.iter().filter(|w| *w == "long").count();
        let is_void = words.iter().any(|w| w == "void");
        let mut ty = if is_void {
            CType::Void
        } else {
            let width = if words.iter().any(|w| w == "char") {
                IntWidth::Char
            } else if words.iter().any(|w| w == "short") {
                IntWidth::Short
            } else if longs >= 2 {
                IntWidth::LongLong
            } else if longs == 1 {
                IntWidth::Long
            } else {
                IntWidth::Int
            };
            if unsigned {
                CType::unsigned(width)
            } else {
                CType::Int {
                    width,
                    signed: true,
                }
            }
        };
        while self.eat(&Tok::Star) {
            ty = CType::pointer_to(ty);
        }
        if matches!(ty, CType::Void) {
            return Err(IntrospectError::type_error(
                "cannot cast an assertion operand to void",
            ));
        }
        Ok(ty)
    }

    fn postfix(&mut self) -> IntrospectResult<Expr> {
        let start = match self.peek() {
            Some(t) => t.start,
            None => {
                return Err(IntrospectError::parse(
                    "expected an expression, found end of input",
                ))
            }
        };
        let mut expr = self.primary()?;
        loop {
            match self.peek().map(|t| &t.tok) {
                Some(Tok::LParen) => {
                    let name = match &expr.kind {
                        ExprKind::Var { name } => name.clone(),
                        _ => {
                            return Err(IntrospectError::parse(
                                "only direct calls by name are supported",
                            ))
                        }
                    };
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.or_expr()?);
                            if self.eat(&Tok::Comma) {
                                continue;
                            }
                            self.expect(Tok::RParen, "')' after call arguments")?;
                            break;
                        }
                    }
                    let ret = self.scope.fn_type(&name)?;
                    expr = dsl::call(name, ret, args);
                }
                Some(Tok::Dot) | Some(Tok::Arrow) => {
                    self.pos += 1;
                    self.expect_member_name()?;
                    expr = self.opaque_from_span(start)?;
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    self.or_expr()?;
                    self.expect(Tok::RBracket, "']' after subscript")?;
                    expr = self.opaque_from_span(start)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn expect_member_name(&mut self) -> IntrospectResult<()> {
        match self.bump() {
            Some(Token {
                tok: Tok::Ident(_), ..
            }) => Ok(()),
            _ => Err(IntrospectError::parse("expected a member name")),
        }
    }

    /// Folds everything from `start` through the last consumed token into
    /// one opaque leaf carrying the source spelling.
    fn opaque_from_span(&self, start: usize) -> IntrospectResult<Expr> {
        let end = self.tokens[self.pos - 1].end;
        let text = self.input[start..end].to_string();
        let ty = self.scope.opaque_type(&text);
        Ok(dsl::opaque(text, ty))
    }

    fn primary(&mut self) -> IntrospectResult<Expr> {
        let token = self.bump().ok_or_else(|| {
            IntrospectError::parse("expected an expression, found end of input")
        })?;
        match token.tok {
            Tok::Int(value) => Ok(Expr::new(
                ExprKind::IntLit {
                    text: self.input[token.start..token.end].to_string(),
                    value,
                },
                CType::int(),
            )),
            Tok::Str(text) => Ok(dsl::str_lit(text)),
            Tok::Ident(name) if name == "NULL" => Ok(dsl::null()),
            Tok::Ident(name) => {
                // A name followed by '(' is a call whose type comes from
                // the function table; one followed by '.', '->' or '[' is
                // the base of an opaque fold. Only plain names are looked
                // up as variables here.
                match self.peek().map(|t| &t.tok) {
                    Some(Tok::LParen) | Some(Tok::Dot) | Some(Tok::Arrow)
                    | Some(Tok::LBracket) => Ok(dsl::var(name, CType::int())),
                    _ => {
                        let ty = self.scope.var_type(&name)?;
                        Ok(dsl::var(name, ty))
                    }
                }
            }
            Tok::LParen => {
                let inner = self.or_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(IntrospectError::parse(format!(
                "unexpected token {:?} at byte {}",
                other, token.start
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::env::MapEnv;
    use crate::eval::record;
    use crate::render;
    use crate::value::Value;

    fn int_scope(names: &[&str]) -> Scope {
        names
            .iter()
            .fold(Scope::new(), |s, n| s.declare_var(*n, CType::int()))
    }

    #[test]
    fn parses_comparison_with_promotion() {
        let scope = Scope::new().declare_var("x", CType::short());
        let e = parse_condition("x == 5", &scope).unwrap();
        let tree = classify(&e);
        assert_eq!(render::symbol_text(&tree, tree.root()), "(int)x == 5");
    }

    #[test]
    fn respects_c_precedence() {
        let scope = int_scope(&["a", "b", "c"]);
        let e = parse_condition("a + b * c == 0 && a < b || b != c", &scope).unwrap();
        // || is outermost, && binds tighter, comparisons tighter still.
        assert!(matches!(e.kind, ExprKind::Or { .. }));
        let ExprKind::Or { left, .. } = &e.kind else {
            unreachable!();
        };
        assert!(matches!(left.kind, ExprKind::And { .. }));
    }

    #[test]
    fn explicit_cast_round_trips_through_rendering() {
        let scope = Scope::new().declare_var("n", CType::int());
        let e = parse_condition("(short int)n == 0", &scope).unwrap();
        let tree = classify(&e);
        assert_eq!(
            render::symbol_text(&tree, tree.root()),
            "(int)(short int)n == 0"
        );
    }

    #[test]
    fn member_access_folds_to_source_text() {
        let scope = Scope::new().declare_var("n", CType::int());
        let e = parse_condition("c.b.a == n", &scope).unwrap();
        let ExprKind::Binary { left, .. } = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(
            left.kind,
            ExprKind::Opaque {
                text: "c.b.a".to_string()
            }
        );
    }

    #[test]
    fn subscript_folds_to_source_text() {
        let scope = int_scope(&["i"]);
        let e = parse_condition("buf[i] == 0", &scope).unwrap();
        let ExprKind::Binary { left, .. } = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(
            left.kind,
            ExprKind::Opaque {
                text: "buf[i]".to_string()
            }
        );
    }

    #[test]
    fn call_with_string_and_null() {
        let scope = Scope::new()
            .declare_var("s", CType::char_ptr())
            .declare_fn("strstr", CType::char_ptr());
        let e = parse_condition("strstr(\"hello world\", s) == NULL", &scope).unwrap();
        let tree = classify(&e);
        assert_eq!(
            render::symbol_text(&tree, tree.root()),
            "strstr(\"hello world\", s) == NULL"
        );
    }

    #[test]
    fn address_of_variable_parses() {
        let scope = Scope::new()
            .declare_var("n", CType::int())
            .declare_var("p", CType::pointer_to(CType::int()));
        let e = parse_condition("&n != p", &scope).unwrap();
        let tree = classify(&e);
        assert_eq!(render::symbol_text(&tree, tree.root()), "&n != p");
    }

    #[test]
    fn undeclared_variable_is_a_type_error() {
        let err = parse_condition("missing == 1", &Scope::new()).unwrap_err();
        assert!(err.to_string().starts_with("type error:"));
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        let scope = int_scope(&["n"]);
        let err = parse_condition("n = 5", &scope).unwrap_err();
        assert!(err.to_string().starts_with("parse error:"));
        assert!(parse_condition("n ==", &scope).is_err());
        assert!(parse_condition("(n == 5", &scope).is_err());
    }

    #[test]
    fn parsed_condition_evaluates_end_to_end() {
        let scope = Scope::new()
            .declare_var("n", CType::int())
            .declare_fn("f", CType::int());
        let e = parse_condition("f(12, n) == 5", &scope).unwrap();
        let tree = classify(&e);
        let mut env = MapEnv::new()
            .with_int("n", 20)
            .with_fn("f", |args: &[Value]| {
                Value::int((args[0].raw_bits() + args[1].raw_bits()) as i64)
            });
        let rec = record(&tree, &mut env).unwrap();
        assert!(!rec.passed());
        assert_eq!(rec.records()[1].text, "f(12, 20)");
    }
}
