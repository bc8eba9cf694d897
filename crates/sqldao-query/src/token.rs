//! Predicate tokens.
//!
//! A filter is a flat sequence of tokens. Tokens never carry parameter
//! ordinals; those are handed out while rendering, so the same token list
//! can be spliced into any statement.

use sqldao_core::{Value, parameter_name};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE
    Like,
    /// NOT LIKE
    NotLike,
}

impl Operator {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

/// Shape of a LIKE pattern built from a plain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikePattern {
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
    /// `%value%`
    Contains,
}

impl LikePattern {
    pub fn apply(self, value: &str) -> String {
        match self {
            LikePattern::StartsWith => format!("{}%", value),
            LikePattern::EndsWith => format!("%{}", value),
            LikePattern::Contains => format!("%{}%", value),
        }
    }
}

/// One element of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `column op placeholder`
    Comparison {
        column: String,
        op: Operator,
        value: Value,
    },
    /// `column IN (placeholder, ...)`, never empty
    In { column: String, values: Vec<Value> },
    /// `column IS [NOT] NULL`
    NullCheck { column: String, negated: bool },
    /// Raw text such as `" AND "`
    Literal(String),
    OpenParen,
    CloseParen,
}

impl Token {
    /// Number of parameter ordinals this token consumes.
    pub fn ordinal_count(&self) -> usize {
        match self {
            Token::Comparison { .. } => 1,
            Token::In { values, .. } => values.len(),
            _ => 0,
        }
    }
}

/// Accumulates rendered text and parameters for a token sequence.
pub(crate) struct TokenWriter<'a> {
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
    pub(crate) next_ordinal: usize,
    prefix: &'a str,
    format_column: &'a dyn Fn(&str) -> String,
}

impl<'a> TokenWriter<'a> {
    pub(crate) fn new(
        start: usize,
        prefix: &'a str,
        format_column: &'a dyn Fn(&str) -> String,
    ) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            next_ordinal: start,
            prefix,
            format_column,
        }
    }

    fn placeholder(&mut self, value: &Value) -> String {
        let name = parameter_name(self.prefix, self.next_ordinal);
        self.next_ordinal += 1;
        self.params.push(value.clone());
        name
    }

    pub(crate) fn write(&mut self, token: &Token) {
        match token {
            Token::Comparison { column, op, value } => {
                let column = (self.format_column)(column);
                let placeholder = self.placeholder(value);
                self.sql
                    .push_str(&format!("{} {} {}", column, op.as_sql(), placeholder));
            }
            Token::In { column, values } => {
                let column = (self.format_column)(column);
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.placeholder(v)).collect();
                self.sql
                    .push_str(&format!("{} IN ({})", column, placeholders.join(", ")));
            }
            Token::NullCheck { column, negated } => {
                let column = (self.format_column)(column);
                let check = if *negated { "IS NOT NULL" } else { "IS NULL" };
                self.sql.push_str(&format!("{} {}", column, check));
            }
            Token::Literal(text) => self.sql.push_str(text),
            Token::OpenParen => self.sql.push('('),
            Token::CloseParen => self.sql.push(')'),
        }
    }
}
