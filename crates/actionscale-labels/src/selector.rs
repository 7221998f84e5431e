//! Kubernetes-style label selectors.
//!
//! ```text
//! env=prod, tier!=cache          equality / inequality
//! zone in (a,b), team notin (x)  set membership
//! gpu, !spot                     existence
//! replicas>2, age<10             integer comparison
//! ```
//!
//! Requirements are joined with `,` and all must match. `!=` and `notin`
//! also match sets that lack the key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{SelectorError, SelectorResult};

/// Labels attached to one object.
pub type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    LessThan,
}

/// One clause of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> SelectorResult<Self> {
        let key = key.into();
        validate_key(&key)?;
        let values: BTreeSet<String> = values.into_iter().collect();
        for v in &values {
            validate_value(v)?;
        }

        let arity_ok = match operator {
            Operator::Equals | Operator::NotEquals => values.len() == 1,
            Operator::In | Operator::NotIn => !values.is_empty(),
            Operator::Exists | Operator::DoesNotExist => values.is_empty(),
            Operator::GreaterThan | Operator::LessThan => {
                values.len() == 1 && values.iter().all(|v| v.parse::<i64>().is_ok())
            }
        };
        if !arity_ok {
            return Err(SelectorError::Parse {
                input: key.clone(),
                reason: format!("invalid values {values:?} for operator {operator:?}"),
            });
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotEquals | Operator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::GreaterThan | Operator::LessThan => {
                let Some(actual) = value.and_then(|v| v.parse::<i64>().ok()) else {
                    return false;
                };
                let Some(bound) = self.values.iter().next().and_then(|v| v.parse::<i64>().ok())
                else {
                    return false;
                };
                if self.operator == Operator::GreaterThan {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, joined()),
            Operator::NotEquals => write!(f, "{}!={}", self.key, joined()),
            Operator::In => write!(f, "{} in ({})", self.key, joined()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, joined()),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, joined()),
            Operator::LessThan => write!(f, "{}<{}", self.key, joined()),
        }
    }
}

/// Conjunction of requirements, kept sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector that matches every label set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// One equality requirement per entry.
    pub fn from_set(set: &LabelSet) -> SelectorResult<Self> {
        let requirements = set
            .iter()
            .map(|(k, v)| Requirement::new(k.clone(), Operator::Equals, [v.clone()]))
            .collect::<SelectorResult<Vec<_>>>()?;
        Ok(Self::from_requirements(requirements))
    }

    pub fn from_requirements(mut requirements: Vec<Requirement>) -> Self {
        requirements.sort_by(|a, b| a.key.cmp(&b.key));
        Self { requirements }
    }

    /// Parse selector syntax. An empty or blank string selects everything.
    pub fn parse(input: &str) -> SelectorResult<Self> {
        let tokens = lex(input)?;
        let requirements = Parser {
            input,
            tokens,
            pos: 0,
        }
        .parse()?;
        Ok(Self::from_requirements(requirements))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_key(key: &str) -> SelectorResult<()> {
    let ok = !key.is_empty()
        && key.len() <= 317
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if ok {
        Ok(())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}

fn validate_value(value: &str) -> SelectorResult<()> {
    let ok = value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SelectorError::InvalidValue(value.to_string()))
    }
}

// ── Lexer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Comma,
    OpenParen,
    CloseParen,
    Bang,
    Eq,
    DoubleEq,
    NotEq,
    Gt,
    Lt,
    In,
    NotIn,
}

fn is_special(c: char) -> bool {
    matches!(c, ',' | '(' | ')' | '!' | '=' | '<' | '>') || c.is_whitespace()
}

fn lex(input: &str) -> SelectorResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            ',' => Token::Comma,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '=' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::DoubleEq
                } else {
                    Token::Eq
                }
            }
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if is_special(n) {
                        break;
                    }
                    end = i + n.len_utf8();
                    chars.next();
                }
                match &input[start..end] {
                    "in" => Token::In,
                    "notin" => Token::NotIn,
                    word => Token::Ident(word.to_string()),
                }
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

// ── Parser ────────────────────────────────────────────────────────

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError::Parse {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> SelectorResult<Vec<Requirement>> {
        let mut requirements = Vec::new();
        if self.tokens.is_empty() {
            return Ok(requirements);
        }
        loop {
            requirements.push(self.requirement()?);
            match self.next() {
                None => return Ok(requirements),
                Some(Token::Comma) => {}
                Some(other) => return Err(self.error(format!("expected ',' but found {other:?}"))),
            }
        }
    }

    fn requirement(&mut self) -> SelectorResult<Requirement> {
        if self.peek() == Some(&Token::Bang) {
            self.next();
            let key = self.key()?;
            return Requirement::new(key, Operator::DoesNotExist, []);
        }

        let key = self.key()?;
        match self.peek() {
            None | Some(Token::Comma) => Requirement::new(key, Operator::Exists, []),
            Some(Token::Eq) | Some(Token::DoubleEq) => {
                self.next();
                let value = self.single_value();
                Requirement::new(key, Operator::Equals, [value])
            }
            Some(Token::NotEq) => {
                self.next();
                let value = self.single_value();
                Requirement::new(key, Operator::NotEquals, [value])
            }
            Some(Token::Gt) | Some(Token::Lt) => {
                let operator = if self.next() == Some(Token::Gt) {
                    Operator::GreaterThan
                } else {
                    Operator::LessThan
                };
                let value = self.single_value();
                if value.parse::<i64>().is_err() {
                    return Err(self.error(format!("'{value}' is not an integer")));
                }
                Requirement::new(key, operator, [value])
            }
            Some(Token::In) | Some(Token::NotIn) => {
                let operator = if self.next() == Some(Token::In) {
                    Operator::In
                } else {
                    Operator::NotIn
                };
                let values = self.value_set()?;
                Requirement::new(key, operator, values)
            }
            Some(other) => {
                let found = format!("{other:?}");
                Err(self.error(format!("unexpected {found} after key '{key}'")))
            }
        }
    }

    fn key(&mut self) -> SelectorResult<String> {
        match self.next() {
            Some(Token::Ident(key)) => Ok(key),
            Some(other) => Err(self.error(format!("expected a label key, found {other:?}"))),
            None => Err(self.error("expected a label key, found end of input")),
        }
    }

    /// Value after `=`, `!=`, `<`, `>`; empty when the clause ends.
    fn single_value(&mut self) -> String {
        match self.peek() {
            Some(Token::Ident(_)) => match self.next() {
                Some(Token::Ident(v)) => v,
                _ => String::new(),
            },
            _ => String::new(),
        }
    }

    fn value_set(&mut self) -> SelectorResult<Vec<String>> {
        if self.next() != Some(Token::OpenParen) {
            return Err(self.error("expected '(' after set operator"));
        }
        let mut values = Vec::new();
        loop {
            match self.next() {
                Some(Token::Ident(v)) => values.push(v),
                Some(Token::CloseParen) if values.is_empty() => {
                    return Err(self.error("empty value set"));
                }
                Some(other) => return Err(self.error(format!("expected a value, found {other:?}"))),
                None => return Err(self.error("unterminated value set")),
            }
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::CloseParen) => return Ok(values),
                Some(other) => {
                    return Err(self.error(format!("expected ',' or ')', found {other:?}")));
                }
                None => return Err(self.error("unterminated value set")),
            }
        }
    }
}
