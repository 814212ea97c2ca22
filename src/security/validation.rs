//! Read-only statement guard.
//!
//! Free-form queries must be a single read: the first keyword (after
//! comments and whitespace) has to be `SELECT` or `WITH`, and no data- or
//! schema-modifying keyword may appear anywhere outside string literals,
//! quoted identifiers and comments.

use crate::error::GatewayError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Type of SQL statement, detected from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Truncate,
    Execute,
    Merge,
    Grant,
    Revoke,
    Other,
}

impl QueryType {
    /// Check if this is a read operation.
    pub fn is_read(&self) -> bool {
        matches!(self, QueryType::Select)
    }
}

// Patterns below are hardcoded and covered by tests.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern '{}': {}", pattern, e))
}

/// Leading-keyword patterns for statement classification.
static QUERY_TYPE_PATTERNS: Lazy<Vec<(Regex, QueryType)>> = Lazy::new(|| {
    vec![
        (compile(r"(?i)^\s*SELECT\b"), QueryType::Select),
        (compile(r"(?i)^\s*WITH\b"), QueryType::Select), // CTEs are SELECT
        (compile(r"(?i)^\s*\(\s*SELECT\b"), QueryType::Select),
        (compile(r"(?i)^\s*INSERT\b"), QueryType::Insert),
        (compile(r"(?i)^\s*UPDATE\b"), QueryType::Update),
        (compile(r"(?i)^\s*DELETE\b"), QueryType::Delete),
        (compile(r"(?i)^\s*CREATE\b"), QueryType::Create),
        (compile(r"(?i)^\s*ALTER\b"), QueryType::Alter),
        (compile(r"(?i)^\s*DROP\b"), QueryType::Drop),
        (compile(r"(?i)^\s*TRUNCATE\b"), QueryType::Truncate),
        (compile(r"(?i)^\s*EXEC(UTE)?\b"), QueryType::Execute),
        (compile(r"(?i)^\s*MERGE\b"), QueryType::Merge),
        (compile(r"(?i)^\s*GRANT\b"), QueryType::Grant),
        (compile(r"(?i)^\s*REVOKE\b"), QueryType::Revoke),
    ]
});

/// Keywords that modify data, schema, permissions, queues, transactions or
/// session state. T-SQL needs no separator between statements, so these are
/// rejected anywhere, not only in leading position.
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "MERGE", "EXEC",
    "EXECUTE", "GRANT", "REVOKE", "DENY", "INTO", "USE", "DISABLE", "ENABLE", "WRITETEXT",
    "UPDATETEXT", "RECEIVE", "SEND", "BEGIN", "COMMIT", "ROLLBACK", "SAVE",
];

/// Dangerous server features rejected anywhere in a query.
static DANGEROUS_KEYWORDS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // Extended stored procedures
        (compile(r"(?i)\bxp_\w+"), "xp_ extended stored procedure"),
        (compile(r"(?i)\bsp_oa\w+"), "sp_oa OLE automation procedure"),
        (compile(r"(?i)\bsp_executesql\b"), "sp_executesql"),
        // External data access
        (compile(r"(?i)\bBULK\b"), "BULK"),
        (compile(r"(?i)\bOPENROWSET\b"), "OPENROWSET"),
        (compile(r"(?i)\bOPENDATASOURCE\b"), "OPENDATASOURCE"),
        (compile(r"(?i)\bOPENQUERY\b"), "OPENQUERY"),
        // Server-level operations
        (compile(r"(?i)\bBACKUP\b"), "BACKUP"),
        (compile(r"(?i)\bRESTORE\b"), "RESTORE"),
        (compile(r"(?i)\bSHUTDOWN\b"), "SHUTDOWN"),
        (compile(r"(?i)\bDBCC\b"), "DBCC"),
        (compile(r"(?i)\bKILL\b"), "KILL"),
        (compile(r"(?i)\bRECONFIGURE\b"), "RECONFIGURE"),
        (compile(r"(?i)\bWAITFOR\b"), "WAITFOR"),
    ]
});

static WORD: Lazy<Regex> = Lazy::new(|| compile(r"\w+"));

static ORDER_BY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bORDER\s+BY\b"));

/// Validator for free-form read queries.
#[derive(Debug, Clone)]
pub struct ReadOnlyGuard {
    max_length: usize,
}

impl ReadOnlyGuard {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Validate a query, returning it trimmed of surrounding whitespace and
    /// trailing semicolons.
    pub fn validate<'q>(&self, query: &'q str) -> Result<&'q str, GatewayError> {
        let trimmed = query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

        if trimmed.is_empty() {
            return Err(GatewayError::validation("Query cannot be empty"));
        }

        if trimmed.len() > self.max_length {
            return Err(GatewayError::validation(format!(
                "Query exceeds maximum length of {} bytes",
                self.max_length
            )));
        }

        let masked = mask_literals_and_comments(trimmed);

        // a trailing comment can hide a trailing `;` from the trim above
        if masked.trim_end().trim_end_matches(';').contains(';') {
            return Err(GatewayError::validation(
                "Only a single statement is allowed; remove the ';' separator",
            ));
        }

        let query_type = detect_query_type(&masked);
        if !query_type.is_read() {
            return Err(GatewayError::validation(format!(
                "Query type {:?} is not allowed. Only SELECT queries (optionally starting with WITH) are permitted.",
                query_type
            )));
        }

        if let Some(keyword) = find_mutating_keyword(&masked) {
            return Err(GatewayError::validation(format!(
                "Keyword '{}' is not allowed in a read-only query",
                keyword
            )));
        }

        for (pattern, keyword) in DANGEROUS_KEYWORDS.iter() {
            if pattern.is_match(&masked) {
                return Err(GatewayError::validation(format!(
                    "Dangerous keyword '{}' is not allowed",
                    keyword
                )));
            }
        }

        Ok(trimmed)
    }
}

/// Detect the type of a (masked) SQL statement.
pub fn detect_query_type(query: &str) -> QueryType {
    for (pattern, query_type) in QUERY_TYPE_PATTERNS.iter() {
        if pattern.is_match(query) {
            return *query_type;
        }
    }

    QueryType::Other
}

/// Whether the outer statement has an ORDER BY clause.
///
/// Only parenthesis depth 0 counts: an `ORDER BY` inside `OVER (...)`, a
/// subquery or a CTE body does not order the final result.
pub fn has_order_by(query: &str) -> bool {
    ORDER_BY.is_match(&outer_level(&mask_literals_and_comments(query)))
}

/// Blank out everything inside parentheses.
fn outer_level(masked: &str) -> String {
    let mut depth = 0usize;
    masked
        .chars()
        .map(|c| match c {
            '(' => {
                depth += 1;
                ' '
            }
            ')' => {
                depth = depth.saturating_sub(1);
                ' '
            }
            _ if depth > 0 => ' ',
            _ => c,
        })
        .collect()
}

/// Whether the statement starts with a common table expression.
pub fn starts_with_cte(query: &str) -> bool {
    let masked = mask_literals_and_comments(query);
    masked
        .trim_start()
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("WITH"))
}

fn find_mutating_keyword(masked: &str) -> Option<String> {
    let words: Vec<&str> = WORD.find_iter(masked).map(|m| m.as_str()).collect();

    for (i, word) in words.iter().enumerate() {
        let upper = word.to_ascii_uppercase();
        if !MUTATING_KEYWORDS.contains(&upper.as_str()) {
            continue;
        }
        // MERGE is also a join/union hint: `INNER MERGE JOIN`, `OPTION (MERGE UNION)`
        if upper == "MERGE" {
            let next = words.get(i + 1).map(|w| w.to_ascii_uppercase());
            if matches!(next.as_deref(), Some("JOIN") | Some("UNION")) {
                continue;
            }
        }
        return Some(upper);
    }

    None
}

/// Replace comments, string literals and quoted identifiers with spaces.
///
/// Keyword checks then only see the statement's own tokens, so a value like
/// `'DROP TABLE'` or a column named `[Update]` is never mistaken for SQL.
pub fn mask_literals_and_comments(query: &str) -> String {
    let chars: Vec<char> = query.chars().collect();
    let mut out = String::with_capacity(query.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('-', Some('-')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                out.push(' ');
            }
            ('/', Some('*')) => {
                // block comments nest in T-SQL
                let mut depth = 0usize;
                while i < chars.len() {
                    if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                        depth += 1;
                        i += 2;
                    } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
                out.push(' ');
            }
            ('\'', _) | ('[', _) | ('"', _) => {
                let close = match c {
                    '\'' => '\'',
                    '[' => ']',
                    _ => '"',
                };
                i += 1;
                while i < chars.len() {
                    if chars[i] == close {
                        // doubled closer is an escaped character
                        if chars.get(i + 1) == Some(&close) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
                out.push_str(if c == '\'' { "''" } else { " x " });
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
