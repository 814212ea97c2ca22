//! Security module for read-only query validation and safe SQL construction.

mod identifiers;
mod like;
mod validation;

pub use identifiers::{
    parse_table_name, quote_identifier, quote_qualified, validate_identifier, TableName,
    MAX_IDENTIFIER_LENGTH,
};
pub use like::{contains_pattern, escape_like};
pub use validation::{
    detect_query_type, has_order_by, mask_literals_and_comments, starts_with_cte, QueryType,
    ReadOnlyGuard,
};
