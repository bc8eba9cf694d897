//! The dialect hook surface.
//!
//! A [`Dialect`] decides identifier quoting, the parameter-name prefix, the
//! statement terminator, row limiting and generated-key retrieval. The
//! default methods describe an ANSI-ish fallback with unquoted identifiers;
//! concrete dialects live in `sqldao-query`.

use std::fmt;

use crate::types::{DataTypeTranslator, StandardTypeTranslator};

/// Default statement terminator.
pub const DEFAULT_TERMINATOR: &str = ";\r\n";

/// Default parameter-name prefix.
pub const DEFAULT_PARAMETER_PREFIX: &str = "@";

/// Where a row-limiting clause goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPlacement {
    /// Directly after `SELECT` (`SELECT TOP n ...`)
    Top,
    /// After the predicate and ordering, just before the terminator
    Trailing,
}

pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short dialect name for logging.
    fn name(&self) -> &'static str;

    fn quote_table(&self, table: &str) -> String {
        table.to_string()
    }

    fn quote_column(&self, column: &str) -> String {
        column.to_string()
    }

    fn parameter_prefix(&self) -> &str {
        DEFAULT_PARAMETER_PREFIX
    }

    fn terminator(&self) -> &str {
        DEFAULT_TERMINATOR
    }

    fn limit_placement(&self) -> LimitPlacement {
        LimitPlacement::Trailing
    }

    /// Render a row limit of `n` for this dialect's placement. `Top`
    /// clauses directly follow `SELECT `.
    fn limit_clause(&self, n: u64) -> String {
        match self.limit_placement() {
            LimitPlacement::Top => format!("TOP {} ", n),
            LimitPlacement::Trailing => format!(" LIMIT {} ", n),
        }
    }

    /// Text appended after an INSERT so that it yields the generated key as
    /// a one-row result set with an `ID` column.
    fn generated_key_suffix(&self, key_column: &str) -> String {
        format!(
            " RETURNING {} AS ID{}",
            self.quote_column(key_column),
            self.terminator()
        )
    }

    /// Database type name translation.
    fn type_translator(&self) -> &dyn DataTypeTranslator {
        &StandardTypeTranslator
    }
}
