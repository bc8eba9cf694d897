//! Entity validators.
//!
//! A [`Validator`] runs before an entity's statement is written. The first
//! failure aborts the commit with [`Error::Validation`](sqldao_core::Error)
//! and nothing reaches the database.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;
use sqldao_core::ValidationError;

use crate::entity::Entity;

type Check = dyn Fn(&Entity) -> Result<(), ValidationError> + Send + Sync;

/// Compiled patterns, shared by every pattern validator in the process.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(regex) = self.cache.read().get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// A reusable entity check.
#[derive(Clone)]
pub struct Validator {
    check: Arc<Check>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Entity) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }

    /// Every non-key, non-nullable column must hold a non-empty value.
    pub fn required() -> Self {
        Self::new(Entity::validate_required)
    }

    /// The current value of `column`, rendered as text, must match `pattern`.
    ///
    /// Null values are left to [`Validator::required`]. An invalid pattern
    /// fails validation with the regex error as its cause.
    pub fn pattern(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        let column = column.into();
        let pattern = pattern.into();
        Self::new(move |entity| {
            let table = entity.schema().name();
            let regex = regex_cache().get_or_compile(&pattern).map_err(|e| {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid validation pattern");
                ValidationError {
                    table: table.to_string(),
                    message: format!("invalid pattern for {}", column),
                    cause: Some(Box::new(e)),
                }
            })?;
            let Some(value) = entity.current_value(&column) else {
                return Ok(());
            };
            if value.is_null() {
                return Ok(());
            }
            let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            if regex.is_match(&text) {
                Ok(())
            } else {
                Err(ValidationError {
                    table: table.to_string(),
                    message: format!("{} does not match {}", column, pattern),
                    cause: None,
                })
            }
        })
    }

    /// Run `validators` in order; the first failure wins.
    pub fn all(validators: impl IntoIterator<Item = Validator>) -> Self {
        let validators: Vec<Validator> = validators.into_iter().collect();
        Self::new(move |entity| validators.iter().try_for_each(|v| v.check(entity)))
    }

    pub fn check(&self, entity: &Entity) -> Result<(), ValidationError> {
        (self.check)(entity)
    }
}
