//! A small reader for the SMT-LIB 2 fragment the solvers send back.
//!
//! Covers model values, `get-unsat-assumptions` lists and `define-fun`
//! bodies produced by `get-interpolant`, which is also enough to move terms
//! between solver instances as text.

use std::collections::HashMap;

use thiserror::Error;

use crate::solver::ModelValue;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Nesting limit for both S-expressions and terms.
const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unbalanced ')' at byte {0}")]
    UnbalancedClose(usize),
    #[error("unterminated quoted symbol or string starting at byte {0}")]
    Unterminated(usize),
    #[error("trailing input at byte {0}")]
    TrailingInput(usize),
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("integer literal `{0}` does not fit in 64 bits")]
    IntegerOverflow(String),
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),
    #[error("{0}")]
    Malformed(String),
}

/// A parsed S-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    /// A bare symbol, numeral or keyword.
    Atom(String),
    /// A `|quoted|` symbol, stored without the bars.
    Quoted(String),
    /// A `"string"` literal, stored without the quotes.
    Str(String),
    List(Vec<SExpr>),
}

impl SExpr {
    /// Parse exactly one S-expression from `input`.
    pub fn parse(input: &str) -> Result<SExpr, ParseError> {
        let mut reader = Reader::new(input);
        let expr = reader.expr(0)?;
        reader.skip_trivia();
        if reader.pos < input.len() {
            return Err(ParseError::TrailingInput(reader.pos));
        }
        Ok(expr)
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// The symbol name, whether bare or quoted.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExpr::Atom(s) | SExpr::Quoted(s) => Some(s),
            _ => None,
        }
    }

    /// Every symbol in this expression, in order.
    pub fn symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<String>) {
        match self {
            SExpr::Atom(s) | SExpr::Quoted(s) => out.push(s.clone()),
            SExpr::Str(_) => {}
            SExpr::List(items) => items.iter().for_each(|i| i.collect_symbols(out)),
        }
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with(';') {
                let line_len = trimmed.find('\n').unwrap_or(trimmed.len());
                self.pos += line_len;
            } else {
                return;
            }
        }
    }

    fn expr(&mut self, depth: usize) -> Result<SExpr, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        self.skip_trivia();
        let start = self.pos;
        let mut chars = self.rest().chars();
        match chars.next() {
            None => Err(ParseError::UnexpectedEof),
            Some(')') => Err(ParseError::UnbalancedClose(start)),
            Some('(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_trivia();
                    match self.rest().chars().next() {
                        None => return Err(ParseError::UnexpectedEof),
                        Some(')') => {
                            self.pos += 1;
                            return Ok(SExpr::List(items));
                        }
                        Some(_) => items.push(self.expr(depth + 1)?),
                    }
                }
            }
            Some(delim @ ('|' | '"')) => {
                let body = &self.rest()[1..];
                let end = body.find(delim).ok_or(ParseError::Unterminated(start))?;
                let text = body[..end].to_string();
                self.pos += end + 2;
                Ok(if delim == '|' {
                    SExpr::Quoted(text)
                } else {
                    SExpr::Str(text)
                })
            }
            Some(_) => {
                let rest = self.rest();
                let len = rest
                    .find(|c: char| c.is_whitespace() || "()|\";".contains(c))
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(SExpr::Atom(rest[..len].to_string()))
            }
        }
    }
}

/// Parse a term from SMT-LIB text.
pub fn parse_term(input: &str) -> Result<SmtTerm, ParseError> {
    term_from_sexpr(&SExpr::parse(input)?)
}

/// Convert an S-expression into a term.
pub fn term_from_sexpr(expr: &SExpr) -> Result<SmtTerm, ParseError> {
    TermBuilder::default().build(expr, 0)
}

/// Extract the body of a nullary `define-fun`, the shape cvc5 uses to
/// answer `get-interpolant`.
pub fn parse_define_fun_body(input: &str) -> Result<SmtTerm, ParseError> {
    let expr = SExpr::parse(input)?;
    let items = match expr.as_list() {
        // Some versions wrap the definition in an extra list.
        Some([inner @ SExpr::List(_)]) => inner.as_list().unwrap_or_default(),
        Some(items) => items,
        None => return Err(ParseError::Malformed("expected define-fun".into())),
    };
    match items {
        [head, _name, SExpr::List(params), _sort, body]
            if head.as_symbol() == Some("define-fun") =>
        {
            if !params.is_empty() {
                return Err(ParseError::Malformed(
                    "define-fun with parameters is not a closed formula".into(),
                ));
            }
            term_from_sexpr(body)
        }
        _ => Err(ParseError::Malformed(format!(
            "expected (define-fun <name> () <sort> <body>), got {input}"
        ))),
    }
}

/// Read a model value printed by `get-value`.
pub fn parse_value(expr: &SExpr) -> Option<ModelValue> {
    match term_from_sexpr(expr).ok()? {
        SmtTerm::IntLit(n) => Some(ModelValue::Int(n)),
        SmtTerm::BoolLit(b) => Some(ModelValue::Bool(b)),
        _ => None,
    }
}

#[derive(Default)]
struct TermBuilder {
    lets: Vec<HashMap<String, SmtTerm>>,
}

impl TermBuilder {
    fn build(&mut self, expr: &SExpr, depth: usize) -> Result<SmtTerm, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        match expr {
            SExpr::Quoted(name) => Ok(self.symbol(name)),
            SExpr::Atom(atom) => self.atom(atom),
            SExpr::Str(s) => Err(ParseError::Malformed(format!(
                "string literal \"{s}\" is not a term"
            ))),
            SExpr::List(items) => self.application(items, depth),
        }
    }

    fn symbol(&self, name: &str) -> SmtTerm {
        self.lets
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or_else(|| SmtTerm::var(name))
    }

    fn atom(&self, atom: &str) -> Result<SmtTerm, ParseError> {
        match atom {
            "true" => Ok(SmtTerm::bool(true)),
            "false" => Ok(SmtTerm::bool(false)),
            _ if atom.starts_with(|c: char| c.is_ascii_digit()) => atom
                .parse::<i64>()
                .map(SmtTerm::int)
                .map_err(|_| ParseError::IntegerOverflow(atom.to_string())),
            _ => Ok(self.symbol(atom)),
        }
    }

    fn application(&mut self, items: &[SExpr], depth: usize) -> Result<SmtTerm, ParseError> {
        let (head, args) = items
            .split_first()
            .ok_or_else(|| ParseError::Malformed("empty application".into()))?;
        let op = match head {
            SExpr::Atom(op) => op.as_str(),
            _ => {
                return Err(ParseError::Malformed(
                    "application head must be a bare symbol".into(),
                ))
            }
        };
        match op {
            "let" => return self.let_binding(args, depth),
            "forall" | "exists" => return self.quantifier(op, args, depth),
            _ => {}
        }
        if op == "-" {
            if let [SExpr::Atom(digits)] = args {
                if digits.starts_with(|c: char| c.is_ascii_digit()) {
                    return negative_literal(digits);
                }
            }
        }

        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            operands.push(self.build(arg, depth + 1)?);
        }
        build_application(op, operands)
    }

    fn let_binding(&mut self, args: &[SExpr], depth: usize) -> Result<SmtTerm, ParseError> {
        let [SExpr::List(bindings), body] = args else {
            return Err(ParseError::Malformed("let expects bindings and a body".into()));
        };
        let mut scope = HashMap::new();
        for binding in bindings {
            match binding.as_list() {
                Some([name, value]) => {
                    let name = name
                        .as_symbol()
                        .ok_or_else(|| ParseError::Malformed("let binding name".into()))?;
                    // Bindings are parallel: values see only the outer scopes.
                    let value = self.build(value, depth + 1)?;
                    scope.insert(name.to_string(), value);
                }
                _ => return Err(ParseError::Malformed("let binding shape".into())),
            }
        }
        self.lets.push(scope);
        let result = self.build(body, depth + 1);
        self.lets.pop();
        result
    }

    fn quantifier(&mut self, op: &str, args: &[SExpr], depth: usize) -> Result<SmtTerm, ParseError> {
        let [SExpr::List(bindings), body] = args else {
            return Err(ParseError::Malformed(format!("{op} expects bindings and a body")));
        };
        let mut vars = Vec::with_capacity(bindings.len());
        let mut shadow = HashMap::new();
        for binding in bindings {
            let (name, sort) = match binding.as_list() {
                Some([name, sort]) => (name.as_symbol(), sort.as_symbol()),
                _ => (None, None),
            };
            let (Some(name), Some(sort)) = (name, sort) else {
                return Err(ParseError::Malformed(format!("{op} binding shape")));
            };
            let sort = match sort {
                "Int" => SmtSort::Int,
                "Bool" => SmtSort::Bool,
                other => return Err(ParseError::Malformed(format!("unknown sort `{other}`"))),
            };
            shadow.insert(name.to_string(), SmtTerm::var(name));
            vars.push((name.to_string(), sort));
        }
        self.lets.push(shadow);
        let body = self.build(body, depth + 1);
        self.lets.pop();
        let body = Box::new(body?);
        Ok(if op == "forall" {
            SmtTerm::ForAll(vars, body)
        } else {
            SmtTerm::Exists(vars, body)
        })
    }
}

fn negative_literal(digits: &str) -> Result<SmtTerm, ParseError> {
    let magnitude: i128 = digits
        .parse()
        .map_err(|_| ParseError::IntegerOverflow(format!("-{digits}")))?;
    i64::try_from(-magnitude)
        .map(SmtTerm::int)
        .map_err(|_| ParseError::IntegerOverflow(format!("-{digits}")))
}

fn build_application(op: &str, operands: Vec<SmtTerm>) -> Result<SmtTerm, ParseError> {
    let arity = |min: usize| {
        if operands.len() < min {
            Err(ParseError::Malformed(format!(
                "`{op}` expects at least {min} operand(s), got {}",
                operands.len()
            )))
        } else {
            Ok(())
        }
    };
    match op {
        "and" => Ok(SmtTerm::and(operands)),
        "or" => Ok(SmtTerm::or(operands)),
        "not" => {
            let [inner] = exactly::<1>(op, operands)?;
            Ok(inner.not())
        }
        "=>" => {
            arity(2)?;
            let mut rev = operands.into_iter().rev();
            let last = rev.next().ok_or(ParseError::UnexpectedEof)?;
            Ok(rev.fold(last, |acc, premise| premise.implies(acc)))
        }
        "ite" => {
            let [c, t, e] = exactly::<3>(op, operands)?;
            Ok(SmtTerm::Ite(Box::new(c), Box::new(t), Box::new(e)))
        }
        "+" | "*" => {
            arity(1)?;
            let combine: fn(SmtTerm, SmtTerm) -> SmtTerm =
                if op == "+" { SmtTerm::add } else { SmtTerm::mul };
            left_fold(operands, combine)
        }
        "-" => {
            arity(1)?;
            if operands.len() == 1 {
                let inner = operands.into_iter().next().ok_or(ParseError::UnexpectedEof)?;
                return Ok(SmtTerm::int(0).sub(inner));
            }
            left_fold(operands, SmtTerm::sub)
        }
        "mod" => {
            let [l, r] = exactly::<2>(op, operands)?;
            Ok(l.modulo(r))
        }
        "distinct" => {
            let [l, r] = exactly::<2>(op, operands)?;
            Ok(l.eq(r).not())
        }
        "=" | "<" | "<=" | ">" | ">=" => {
            arity(2)?;
            let relate: fn(SmtTerm, SmtTerm) -> SmtTerm = match op {
                "=" => SmtTerm::eq,
                "<" => SmtTerm::lt,
                "<=" => SmtTerm::le,
                ">" => SmtTerm::gt,
                _ => SmtTerm::ge,
            };
            // Chains like (< a b c) mean (and (< a b) (< b c)).
            let mut links: Vec<SmtTerm> = operands
                .windows(2)
                .map(|pair| relate(pair[0].clone(), pair[1].clone()))
                .collect();
            if links.len() == 1 {
                Ok(links.remove(0))
            } else {
                Ok(SmtTerm::and(links))
            }
        }
        other => Err(ParseError::UnsupportedOperator(other.to_string())),
    }
}

fn exactly<const N: usize>(op: &str, operands: Vec<SmtTerm>) -> Result<[SmtTerm; N], ParseError> {
    let got = operands.len();
    operands.try_into().map_err(|_| {
        ParseError::Malformed(format!("`{op}` expects {N} operand(s), got {got}"))
    })
}

fn left_fold(
    operands: Vec<SmtTerm>,
    combine: fn(SmtTerm, SmtTerm) -> SmtTerm,
) -> Result<SmtTerm, ParseError> {
    let mut iter = operands.into_iter();
    let first = iter.next().ok_or(ParseError::UnexpectedEof)?;
    Ok(iter.fold(first, combine))
}
