//! SQL identifier quoting helpers used by the dialects.
//!
//! Each helper escapes the closing delimiter by doubling it, so any input
//! string yields a single well-formed identifier.

/// Quote an identifier using ANSI double-quoting.
///
/// ```
/// use sqldao_core::quote_ident;
///
/// assert_eq!(quote_ident("Orders"), "\"Orders\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier using MySQL backticks.
///
/// ```
/// use sqldao_core::quote_ident_mysql;
///
/// assert_eq!(quote_ident_mysql("Orders"), "`Orders`");
/// ```
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote an identifier using SQL Server brackets.
///
/// ```
/// use sqldao_core::quote_ident_mssql;
///
/// assert_eq!(quote_ident_mssql("Order Items"), "[Order Items]");
/// assert_eq!(quote_ident_mssql("a]b"), "[a]]b]");
/// ```
#[inline]
pub fn quote_ident_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Strip everything except ASCII alphanumerics and underscores.
///
/// Used where an identifier is spliced into generated names, such as the
/// `{Table}Id` link columns of a cross-reference table.
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
