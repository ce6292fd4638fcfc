//! Run search filter
//!
//! Parses filter strings such as
//! `metrics.acc > 0.9 AND params."learning rate" = '0.01'` into clauses
//! that are evaluated against a run's latest metrics, params, tags and
//! attributes.

use crate::entities::Run;
use crate::error::{Result, TrackingError};

/// Which part of a run a clause looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Metric,
    Param,
    Tag,
    Attribute,
}

impl EntityKind {
    fn parse(identifier: &str) -> Result<Self> {
        match identifier.to_ascii_lowercase().as_str() {
            "metric" | "metrics" => Ok(Self::Metric),
            "parameter" | "parameters" | "param" | "params" => Ok(Self::Param),
            "tag" | "tags" => Ok(Self::Tag),
            "attribute" | "attributes" | "attr" | "run" => Ok(Self::Attribute),
            other => Err(invalid(format!(
                "Invalid entity type '{}'. Valid values are ['metric', 'parameter', 'tag', 'attribute']",
                other
            ))),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
}

impl Comparator {
    fn parse(op: &str) -> Result<Self> {
        match op {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            other => Err(invalid(format!("Invalid comparator '{}'", other))),
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    fn compare_f64(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
        }
    }

    fn compare_str(&self, lhs: &str, rhs: &str) -> bool {
        match self {
            Self::Ne => lhs != rhs,
            _ => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

/// One `<type>.<key> <comparator> <value>` clause
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: EntityKind,
    pub key: String,
    pub comparator: Comparator,
    pub value: FilterValue,
}

const SEARCHABLE_ATTRIBUTES: [&str; 3] = ["status", "user_id", "artifact_uri"];

impl Clause {
    /// A run without the referenced key never matches
    pub fn matches(&self, run: &Run) -> bool {
        match (&self.kind, &self.value) {
            (EntityKind::Metric, FilterValue::Number(expected)) => run
                .data
                .metric(&self.key)
                .is_some_and(|actual| self.comparator.compare_f64(actual, *expected)),
            (EntityKind::Param, FilterValue::Text(expected)) => run
                .data
                .param(&self.key)
                .is_some_and(|actual| self.comparator.compare_str(actual, expected)),
            (EntityKind::Tag, FilterValue::Text(expected)) => run
                .data
                .tag(&self.key)
                .is_some_and(|actual| self.comparator.compare_str(actual, expected)),
            (EntityKind::Attribute, FilterValue::Text(expected)) => {
                let actual = match self.key.as_str() {
                    "status" => run.info.status.as_str(),
                    "user_id" => run.info.user_id.as_str(),
                    "artifact_uri" => run.info.artifact_uri.as_str(),
                    _ => return false,
                };
                self.comparator.compare_str(actual, expected)
            }
            _ => false,
        }
    }
}

/// Parsed filter: all clauses must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub clauses: Vec<Clause>,
}

impl SearchFilter {
    /// Parse a filter string; an empty or blank filter matches every run
    pub fn parse(filter: &str) -> Result<Self> {
        let mut parser = Parser::new(filter);
        let mut clauses = Vec::new();

        parser.skip_whitespace();
        if parser.at_end() {
            return Ok(Self { clauses });
        }

        loop {
            clauses.push(parser.clause()?);
            parser.skip_whitespace();
            if parser.at_end() {
                break;
            }
            parser.expect_and()?;
        }

        Ok(Self { clauses })
    }

    pub fn matches(&self, run: &Run) -> bool {
        self.clauses.iter().all(|clause| clause.matches(run))
    }
}

fn invalid(message: impl Into<String>) -> TrackingError {
    TrackingError::invalid_parameter(message)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Text between `quote` characters; the opening quote is at the cursor
    fn quoted(&mut self, quote: char) -> Result<&'a str> {
        self.pos += quote.len_utf8();
        let rest = self.rest();
        match rest.find(quote) {
            Some(end) => {
                self.pos += end + quote.len_utf8();
                Ok(&rest[..end])
            }
            None => Err(invalid(format!(
                "Unterminated quoted string in filter at position {}",
                self.pos
            ))),
        }
    }

    fn clause(&mut self) -> Result<Clause> {
        self.skip_whitespace();
        let identifier = match self.peek() {
            Some('`') => self.quoted('`')?,
            _ => self.take_while(|c| c.is_alphanumeric() || c == '_'),
        };
        if identifier.is_empty() {
            return Err(invalid(format!(
                "Invalid filter near '{}': expected '<type>.<key>'",
                self.rest()
            )));
        }
        let kind = EntityKind::parse(identifier)?;

        if self.peek() != Some('.') {
            return Err(invalid(format!(
                "Invalid identifier '{}': expected '<type>.<key>'",
                identifier
            )));
        }
        self.pos += 1;

        let key = match self.peek() {
            Some(q @ ('`' | '"')) => self.quoted(q)?,
            _ => self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '/' | '-' | '.')),
        };
        if key.is_empty() {
            return Err(invalid(format!("Missing key after '{}.'", identifier)));
        }
        if kind == EntityKind::Attribute && !SEARCHABLE_ATTRIBUTES.contains(&key) {
            return Err(invalid(format!(
                "Invalid attribute key '{}' specified. Valid keys are {:?}",
                key, SEARCHABLE_ATTRIBUTES
            )));
        }

        self.skip_whitespace();
        let op = self.take_while(|c| matches!(c, '<' | '>' | '=' | '!'));
        let comparator = Comparator::parse(op)?;

        self.skip_whitespace();
        let value = match kind {
            EntityKind::Metric => {
                let literal = self.take_while(|c| !c.is_whitespace());
                let number = literal.parse::<f64>().ok().filter(|n| n.is_finite());
                match number {
                    Some(n) => FilterValue::Number(n),
                    None => {
                        return Err(invalid(format!(
                            "Expected numeric value for metric '{}', got '{}'",
                            key, literal
                        )))
                    }
                }
            }
            _ => {
                if !comparator.is_equality() {
                    return Err(invalid(format!(
                        "Invalid comparator '{}' for string comparison. Only '=' and '!=' are supported",
                        op
                    )));
                }
                match self.peek() {
                    Some(q @ ('\'' | '"')) => FilterValue::Text(self.quoted(q)?.to_string()),
                    _ => {
                        return Err(invalid(format!(
                            "Value for '{}' must be a quoted string",
                            key
                        )))
                    }
                }
            }
        };

        Ok(Clause {
            kind,
            key: key.to_string(),
            comparator,
            value,
        })
    }

    fn expect_and(&mut self) -> Result<()> {
        let word = self.take_while(|c| c.is_alphabetic());
        if !word.eq_ignore_ascii_case("and") {
            return Err(invalid(format!(
                "Expected 'AND' between filter clauses, got '{}'",
                if word.is_empty() { self.rest() } else { word }
            )));
        }
        if !self.peek().is_some_and(char::is_whitespace) {
            return Err(invalid("Expected whitespace after 'AND'"));
        }
        Ok(())
    }
}
