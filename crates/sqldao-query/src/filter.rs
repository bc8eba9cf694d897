//! Composable filters.
//!
//! ```
//! use sqldao_query::Filter;
//!
//! let adults = Filter::col("Age").gt(30)?;
//! let rendered = adults.render(1);
//! assert_eq!(rendered.sql, "Age > @P1");
//!
//! let named = Filter::col("Name").starts_with("Al") & Filter::col("Active").eq(true);
//! assert_eq!(named.to_string(), "(Name LIKE @P1) AND (Active = @P2)");
//! # Ok::<(), sqldao_core::Error>(())
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr};

use sqldao_core::{
    DEFAULT_PARAMETER_PREFIX, Error, FilterErrorKind, Result, TableSchema, Value, map_u64_to_i64,
};

use crate::token::{LikePattern, Operator, Token, TokenWriter};

/// Entry point for building a predicate on one column.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    column: String,
}

impl FilterBuilder {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }

    fn compare(self, op: Operator, value: Value) -> Filter {
        let token = match (op, value.is_null()) {
            (Operator::Eq, true) => Token::NullCheck {
                column: self.column,
                negated: false,
            },
            (Operator::Ne, true) => Token::NullCheck {
                column: self.column,
                negated: true,
            },
            (op, _) => Token::Comparison {
                column: self.column,
                op,
                value,
            },
        };
        Filter::from_token(token)
    }

    fn like(self, op: Operator, pattern: LikePattern, value: &str) -> Filter {
        self.compare(op, Value::Text(pattern.apply(value)))
    }

    /// `column = value`, or `IS NULL` for a null value.
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Eq, value.into())
    }

    /// `column <> value`, or `IS NOT NULL` for a null value.
    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Ne, value.into())
    }

    /// Equality against an unsigned value stored with the order-preserving
    /// signed mapping.
    pub fn eq_u64(self, value: u64) -> Filter {
        self.compare(Operator::Eq, Value::BigInt(map_u64_to_i64(value)))
    }

    pub fn ne_u64(self, value: u64) -> Filter {
        self.compare(Operator::Ne, Value::BigInt(map_u64_to_i64(value)))
    }

    /// Shared body of the ordered comparisons. NULL has no ordering, so
    /// these fail with [`FilterErrorKind::NullComparison`] instead of
    /// binding a parameter that never matches.
    fn ordered(self, op: Operator, value: Value) -> Result<Filter> {
        if value.is_null() {
            return Err(Error::malformed_filter(
                FilterErrorKind::NullComparison,
                Some(&self.column),
                format!("NULL cannot be compared with {}", op.as_sql()),
            ));
        }
        Ok(self.compare(op, value))
    }

    /// `column < value`.
    pub fn lt(self, value: impl Into<Value>) -> Result<Filter> {
        self.ordered(Operator::Lt, value.into())
    }

    pub fn le(self, value: impl Into<Value>) -> Result<Filter> {
        self.ordered(Operator::Le, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Result<Filter> {
        self.ordered(Operator::Gt, value.into())
    }

    pub fn ge(self, value: impl Into<Value>) -> Result<Filter> {
        self.ordered(Operator::Ge, value.into())
    }

    pub fn starts_with(self, value: &str) -> Filter {
        self.like(Operator::Like, LikePattern::StartsWith, value)
    }

    pub fn ends_with(self, value: &str) -> Filter {
        self.like(Operator::Like, LikePattern::EndsWith, value)
    }

    pub fn contains(self, value: &str) -> Filter {
        self.like(Operator::Like, LikePattern::Contains, value)
    }

    pub fn doesnt_start_with(self, value: &str) -> Filter {
        self.like(Operator::NotLike, LikePattern::StartsWith, value)
    }

    pub fn doesnt_end_with(self, value: &str) -> Filter {
        self.like(Operator::NotLike, LikePattern::EndsWith, value)
    }

    pub fn doesnt_contain(self, value: &str) -> Filter {
        self.like(Operator::NotLike, LikePattern::Contains, value)
    }

    /// `column IN (...)`.
    ///
    /// Fails with [`FilterErrorKind::EmptyValueSet`] when `values` is empty,
    /// so an empty set never reaches the database.
    pub fn in_values<I, V>(self, values: I) -> Result<Filter>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Error::malformed_filter(
                FilterErrorKind::EmptyValueSet,
                Some(&self.column),
                "at least one value must be specified",
            ));
        }
        Ok(Filter::from_token(Token::In {
            column: self.column,
            values,
        }))
    }

    pub fn is_null(self) -> Filter {
        Filter::from_token(Token::NullCheck {
            column: self.column,
            negated: false,
        })
    }

    pub fn is_not_null(self) -> Filter {
        Filter::from_token(Token::NullCheck {
            column: self.column,
            negated: true,
        })
    }
}

/// Shorthand for [`Filter::col`].
pub fn col(column: impl Into<String>) -> FilterBuilder {
    FilterBuilder::new(column)
}

/// Output of [`Filter::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFilter {
    pub sql: String,
    pub params: Vec<Value>,
    /// First ordinal not used by this filter
    pub next_ordinal: usize,
}

/// An immutable boolean expression over columns.
///
/// Two filters are equal when they render to the same text from ordinal 1.
#[derive(Debug, Clone)]
pub struct Filter {
    tokens: Vec<Token>,
}

impl Filter {
    /// Start a predicate on `column`.
    pub fn col(column: impl Into<String>) -> FilterBuilder {
        FilterBuilder::new(column)
    }

    fn from_token(token: Token) -> Self {
        Self {
            tokens: vec![token],
        }
    }

    /// A raw SQL fragment with no parameters.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::from_token(Token::Literal(text.into()))
    }

    /// Build an AND-combined equality filter from field/value pairs.
    ///
    /// Every field must be a column of `schema`.
    pub fn from_fields<I, K, V>(schema: &TableSchema, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut combined: Option<Filter> = None;
        for (field, value) in fields {
            let field = field.as_ref();
            if field.is_empty() {
                return Err(Error::malformed_filter(
                    FilterErrorKind::MissingColumn,
                    None,
                    "field name must not be empty",
                ));
            }
            let column = schema.column(field).ok_or_else(|| {
                Error::malformed_filter(
                    FilterErrorKind::UnknownField,
                    Some(field),
                    format!("{} has no such field", schema.name()),
                )
            })?;
            let next = Filter::col(column.name.clone()).eq(value);
            combined = Some(match combined {
                Some(filter) => filter.and(next),
                None => next,
            });
        }
        combined.ok_or_else(|| {
            Error::malformed_filter(
                FilterErrorKind::MissingColumn,
                None,
                "at least one field must be specified",
            )
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of parameter ordinals consumed when rendered.
    pub fn ordinal_count(&self) -> usize {
        self.tokens.iter().map(Token::ordinal_count).sum()
    }

    fn join(mut self, separator: &str, other: Filter) -> Filter {
        self.tokens.push(Token::Literal(separator.to_string()));
        self.tokens.extend(other.tokens);
        self
    }

    fn join_grouped(self, separator: &str, other: Filter) -> Filter {
        let mut tokens = Vec::with_capacity(self.tokens.len() + other.tokens.len() + 5);
        tokens.push(Token::OpenParen);
        tokens.extend(self.tokens);
        tokens.push(Token::CloseParen);
        tokens.push(Token::Literal(separator.to_string()));
        tokens.push(Token::OpenParen);
        tokens.extend(other.tokens);
        tokens.push(Token::CloseParen);
        Filter { tokens }
    }

    /// Append `AND other` without grouping.
    pub fn and(self, other: Filter) -> Filter {
        self.join(" AND ", other)
    }

    /// Append `OR other` without grouping.
    pub fn or(self, other: Filter) -> Filter {
        self.join(" OR ", other)
    }

    /// Render with the default `@` prefix and unformatted column names.
    pub fn render(&self, start: usize) -> RenderedFilter {
        self.render_with(start, DEFAULT_PARAMETER_PREFIX, &|c: &str| c.to_string())
    }

    /// Render starting at ordinal `start` with the given parameter prefix
    /// and column formatter.
    pub fn render_with(
        &self,
        start: usize,
        prefix: &str,
        format_column: &dyn Fn(&str) -> String,
    ) -> RenderedFilter {
        let mut writer = TokenWriter::new(start, prefix, format_column);
        for token in &self.tokens {
            writer.write(token);
        }
        tracing::trace!(
            start,
            params = writer.params.len(),
            sql = %writer.sql,
            "Rendered filter"
        );
        RenderedFilter {
            sql: writer.sql,
            params: writer.params,
            next_ordinal: writer.next_ordinal,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(1).sql)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.render(1).sql == other.render(1).sql
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.render(1).sql.hash(state);
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.join_grouped(" AND ", rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.join_grouped(" OR ", rhs)
    }
}
