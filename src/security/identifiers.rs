//! SQL Server identifier parsing and escaping.
//!
//! Uses SQL Server's bracket notation `[identifier]` to safely escape identifiers.

use crate::error::GatewayError;

/// Maximum length for SQL Server identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// A table reference supplied by a caller: `name` or `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Quote a single identifier using bracket notation.
///
/// ```
/// use azure_sql_mcp::security::quote_identifier;
///
/// assert_eq!(quote_identifier("Customers"), "[Customers]");
/// assert_eq!(quote_identifier("Order Details"), "[Order Details]");
/// assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Quote a schema-qualified name: `[schema].[name]`.
pub fn quote_qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(name))
}

/// Validate that an identifier contains no statement-breaking sequences.
pub fn validate_identifier(identifier: &str) -> Result<(), GatewayError> {
    if identifier.trim().is_empty() {
        return Err(GatewayError::validation("Identifier cannot be empty"));
    }

    let dangerous_patterns = [
        "--",   // SQL comment
        "/*",   // Multi-line comment start
        "*/",   // Multi-line comment end
        ";",    // Statement separator
        "'",    // String delimiter
        "\"",   // Quoted identifier delimiter (brackets are used instead)
        "\\",   // Escape character
        "\x00", // Null byte
    ];

    for pattern in &dangerous_patterns {
        if identifier.contains(pattern) {
            return Err(GatewayError::validation(format!(
                "Identifier contains forbidden character sequence: {}",
                pattern.escape_debug()
            )));
        }
    }

    if identifier.chars().any(char::is_control) {
        return Err(GatewayError::validation(
            "Identifier contains control characters",
        ));
    }

    Ok(())
}

/// Parse a potentially schema-qualified table name.
///
/// Accepts `Customers`, `dbo.Customers`, `[Order Details]` and
/// `dbo.[Order Details]`. Brackets are removed (with `]]` unescaped); dots
/// inside brackets do not split.
pub fn parse_table_name(input: &str) -> Result<TableName, GatewayError> {
    validate_identifier(input)?;

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = input.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' if current.trim().is_empty() => {
                current.clear();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == ']' {
                        if chars.peek() == Some(&']') {
                            chars.next();
                            current.push(']');
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    current.push(inner);
                }
                if !closed {
                    return Err(GatewayError::validation(format!(
                        "Unterminated bracket in identifier: {}",
                        input
                    )));
                }
            }
            '.' => parts.push(std::mem::take(&mut current)),
            '[' | ']' => {
                return Err(GatewayError::validation(format!(
                    "Unexpected bracket in identifier: {}",
                    input
                )))
            }
            _ => current.push(c),
        }
    }
    parts.push(current);

    let parts: Vec<String> = parts.into_iter().map(|p| p.trim().to_string()).collect();

    if parts.iter().any(|p| p.is_empty()) {
        return Err(GatewayError::validation(format!(
            "Invalid table name: {}",
            input
        )));
    }

    if let Some(part) = parts.iter().find(|p| p.chars().count() > MAX_IDENTIFIER_LENGTH) {
        return Err(GatewayError::validation(format!(
            "Identifier exceeds maximum length of {} characters: {}",
            MAX_IDENTIFIER_LENGTH, part
        )));
    }

    match parts.len() {
        1 => Ok(TableName {
            schema: None,
            name: parts[0].clone(),
        }),
        2 => Ok(TableName {
            schema: Some(parts[0].clone()),
            name: parts[1].clone(),
        }),
        _ => Err(GatewayError::validation(format!(
            "Table name must be 'table' or 'schema.table': {}",
            input
        ))),
    }
}
