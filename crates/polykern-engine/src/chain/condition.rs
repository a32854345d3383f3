//! Execution conditions: compile once at chain build, evaluate per exchange.
//!
//! Format: clauses joined by `&&`, each one of
//! - `subject == "literal"`
//! - `subject != "literal"`
//! - `subject startsWith "literal"`
//! - `subject exists`
//!
//! Subjects: `request.method`, `request.path`, `request.headers.<name>`,
//! `response.status`, `response.headers.<name>`, `metadata.<key>`.

use polykern_core::error::{PolykernError, Result};
use polykern_core::ExchangeContext;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Subject {
    RequestMethod,
    RequestPath,
    RequestHeader(String),
    ResponseStatus,
    ResponseHeader(String),
    Metadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Eq(String),
    Ne(String),
    StartsWith(String),
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    subject: Subject,
    op: Op,
}

/// Compiled execution condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    raw: String,
    clauses: Vec<Clause>,
}

impl Condition {
    /// Compile an expression. Blank input means "no condition" (`None`).
    pub fn compile(raw: &str) -> Result<Option<Condition>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let mut clauses = Vec::new();
        for part in split_clauses(raw) {
            clauses.push(parse_clause(part.trim()).map_err(|reason| {
                PolykernError::InvalidConfig(format!(
                    "invalid execution condition {raw:?}: {reason}"
                ))
            })?);
        }

        Ok(Some(Condition {
            raw: raw.to_string(),
            clauses,
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All clauses must hold.
    pub fn matches(&self, ctx: &ExchangeContext) -> bool {
        self.clauses.iter().all(|c| c.matches(ctx))
    }
}

impl Clause {
    fn matches(&self, ctx: &ExchangeContext) -> bool {
        let value = resolve(&self.subject, ctx);
        match (&self.op, value) {
            (Op::Exists, v) => v.is_some(),
            (Op::Eq(lit), Some(v)) => &v == lit,
            (Op::Ne(lit), Some(v)) => &v != lit,
            (Op::Ne(_), None) => true,
            (Op::StartsWith(lit), Some(v)) => v.starts_with(lit.as_str()),
            (_, None) => false,
        }
    }
}

fn resolve(subject: &Subject, ctx: &ExchangeContext) -> Option<String> {
    match subject {
        Subject::RequestMethod => Some(ctx.request.method.clone()),
        Subject::RequestPath => Some(ctx.request.path.clone()),
        Subject::RequestHeader(name) => ctx.request.headers.get(name).map(str::to_string),
        Subject::ResponseStatus => match ctx.response.status {
            0 => None,
            s => Some(s.to_string()),
        },
        Subject::ResponseHeader(name) => ctx.response.headers.get(name).map(str::to_string),
        Subject::Metadata(key) => ctx.metadata.get(key).and_then(|v| v.to_display_string()),
    }
}

/// Split on `&&` outside quoted literals.
fn split_clauses(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '&') if matches!(chars.peek(), Some((_, '&'))) => {
                parts.push(&raw[start..i]);
                chars.next();
                start = i + 2;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn parse_clause(s: &str) -> std::result::Result<Clause, String> {
    let (subject_s, rest) = match s.split_once(char::is_whitespace) {
        Some((a, b)) => (a, b.trim()),
        None => return Err(format!("incomplete clause: {s:?}")),
    };
    let subject = parse_subject(subject_s)?;

    if rest == "exists" {
        return Ok(Clause { subject, op: Op::Exists });
    }

    let (op_s, lit_s) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| format!("missing operand in clause: {s:?}"))?;
    let lit = parse_literal(lit_s.trim())?;

    let op = match op_s {
        "==" => Op::Eq(lit),
        "!=" => Op::Ne(lit),
        "startsWith" => Op::StartsWith(lit),
        other => return Err(format!("unknown operator: {other}")),
    };
    Ok(Clause { subject, op })
}

fn parse_subject(s: &str) -> std::result::Result<Subject, String> {
    match s {
        "request.method" => return Ok(Subject::RequestMethod),
        "request.path" => return Ok(Subject::RequestPath),
        "response.status" => return Ok(Subject::ResponseStatus),
        _ => {}
    }
    let named = |prefix: &str| {
        s.strip_prefix(prefix)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    };
    if let Some(h) = named("request.headers.") {
        return Ok(Subject::RequestHeader(h.to_ascii_lowercase()));
    }
    if let Some(h) = named("response.headers.") {
        return Ok(Subject::ResponseHeader(h.to_ascii_lowercase()));
    }
    if let Some(k) = named("metadata.") {
        return Ok(Subject::Metadata(k));
    }
    Err(format!("unknown subject: {s}"))
}

fn parse_literal(s: &str) -> std::result::Result<String, String> {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q) {
            return inner
                .strip_suffix(q)
                .map(str::to_string)
                .ok_or_else(|| format!("unterminated literal: {s}"));
        }
    }
    if s.is_empty() || s.contains(char::is_whitespace) {
        return Err(format!("invalid literal: {s:?}"));
    }
    Ok(s.to_string())
}
