//! Structured exploration of any table: filtered search, range search,
//! column profiling and grouped aggregation.
//!
//! Callers name tables and columns, never SQL. Both are resolved against the
//! catalog and only the catalog's spelling is spliced into statement text,
//! bracket-quoted. Every value travels as a bound parameter and operators
//! come from a closed set.

use super::catalog::resolve_table;
use super::{
    resolve_limit, text_column, AdvancedSearchArgs, Aggregate, AggregateFn, CustomAggregationArgs,
    DataProfilingArgs, Filter, FilterOp, Gateway, HavingCondition, RangeSearchArgs,
};
use crate::constants::{MAX_AGGREGATES, MAX_FILTERS, MAX_IN_VALUES, PROFILE_TOP_VALUES};
use crate::database::{ColumnInfo, QueryResult, SqlParam, SqlSession, Statement};
use crate::error::GatewayError;
use crate::security::{
    contains_pattern, escape_like, parse_table_name, quote_identifier, quote_qualified,
    validate_identifier, TableName, MAX_IDENTIFIER_LENGTH,
};
use serde_json::{json, Map, Value};

const TABLE_COLUMNS_SQL: &str = "\
SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type \
FROM INFORMATION_SCHEMA.COLUMNS \
WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 \
ORDER BY ORDINAL_POSITION";

/// Longest text value accepted in a filter.
const MAX_FILTER_TEXT_CHARS: usize = 4_000;

/// How a column's type may be compared and aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    Numeric,
    Text,
    Temporal,
    /// text, ntext, image and friends: no comparison, grouping or DISTINCT
    Large,
    Other,
}

impl ColumnClass {
    fn of(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "int" | "bigint" | "decimal" | "numeric" | "float"
            | "real" | "money" | "smallmoney" => ColumnClass::Numeric,
            "char" | "varchar" | "nchar" | "nvarchar" => ColumnClass::Text,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "time" => {
                ColumnClass::Temporal
            }
            "text" | "ntext" | "image" | "xml" | "geography" | "geometry" => ColumnClass::Large,
            _ => ColumnClass::Other,
        }
    }

    fn comparable(self) -> bool {
        self != ColumnClass::Large
    }

    fn ordered(self) -> bool {
        matches!(
            self,
            ColumnClass::Numeric | ColumnClass::Text | ColumnClass::Temporal
        )
    }
}

struct CatalogColumn {
    name: String,
    data_type: String,
    class: ColumnClass,
}

impl CatalogColumn {
    fn quoted(&self) -> String {
        quote_identifier(&self.name)
    }
}

/// A table resolved against the catalog, with its columns in ordinal order.
struct ResolvedTable {
    schema: String,
    name: String,
    columns: Vec<CatalogColumn>,
}

impl ResolvedTable {
    async fn load(session: &mut dyn SqlSession, table: &TableName) -> Result<Self, GatewayError> {
        let (schema, name) = resolve_table(session, table).await?;

        let statement = Statement::new(TABLE_COLUMNS_SQL)
            .bind(SqlParam::Text(schema.clone()))
            .bind(SqlParam::Text(name.clone()));
        let found = session.query(&statement).await?;

        let mut columns = Vec::with_capacity(found.row_count);
        for row in 0..found.rows.len() {
            let data_type = text_column(&found, row, "data_type")?;
            columns.push(CatalogColumn {
                name: text_column(&found, row, "column_name")?,
                class: ColumnClass::of(&data_type),
                data_type,
            });
        }

        Ok(Self {
            schema,
            name,
            columns,
        })
    }

    fn quoted(&self) -> String {
        quote_qualified(&self.schema, &self.name)
    }

    fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// The catalog column a caller meant, ignoring case.
    fn column(&self, requested: &str) -> Result<&CatalogColumn, GatewayError> {
        let wanted = requested.to_lowercase();
        self.columns
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .ok_or_else(|| {
                GatewayError::not_found("Column", format!("{}.{}", self.display_name(), requested))
            })
    }
}

/// Strip optional brackets and reject names that could never be a column.
fn requested_column(raw: &str) -> Result<String, GatewayError> {
    let trimmed = raw.trim();
    let name = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .trim();

    validate_identifier(name)?;
    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(GatewayError::validation(format!(
            "Column name exceeds {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// A JSON scalar as a bound parameter.
fn scalar(name: &str, value: &Value) -> Result<SqlParam, GatewayError> {
    match value {
        Value::Bool(b) => Ok(SqlParam::Int(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlParam::Int(i)),
            None => n.as_f64().map(SqlParam::Float).ok_or_else(|| {
                GatewayError::validation(format!("{} is not a representable number", name))
            }),
        },
        Value::String(s) if s.chars().count() > MAX_FILTER_TEXT_CHARS => Err(
            GatewayError::validation(format!(
                "{} exceeds {} characters",
                name, MAX_FILTER_TEXT_CHARS
            )),
        ),
        Value::String(s) => Ok(SqlParam::Text(s.clone())),
        Value::Null => Err(GatewayError::validation(format!("{} needs a value", name))),
        Value::Array(_) | Value::Object(_) => Err(GatewayError::validation(format!(
            "{} must be a number, string or boolean",
            name
        ))),
    }
}

fn like_text(name: &str, value: &Value) -> Result<String, GatewayError> {
    match scalar(name, value)? {
        SqlParam::Text(s) => Ok(s),
        SqlParam::Int(i) => Ok(i.to_string()),
        SqlParam::Float(f) => Ok(f.to_string()),
        SqlParam::Date(d) => Ok(d.to_string()),
    }
}

/// Positional parameters; each push returns its placeholder.
#[derive(Default)]
struct Params(Vec<SqlParam>);

impl Params {
    fn push(&mut self, param: SqlParam) -> String {
        self.0.push(param);
        format!("@P{}", self.0.len())
    }

    fn into_statement(self, text: String) -> Statement {
        self.0
            .into_iter()
            .fold(Statement::new(text), |statement, param| statement.bind(param))
    }
}

/// A filter whose operator and value shape have been checked.
struct CheckedFilter {
    column: String,
    op: FilterOp,
    values: Vec<SqlParam>,
}

fn check_filters(filters: &[Filter]) -> Result<Vec<CheckedFilter>, GatewayError> {
    if filters.len() > MAX_FILTERS {
        return Err(GatewayError::validation(format!(
            "At most {} filters are allowed, got {}",
            MAX_FILTERS,
            filters.len()
        )));
    }
    filters.iter().map(check_filter).collect()
}

fn check_filter(filter: &Filter) -> Result<CheckedFilter, GatewayError> {
    let column = requested_column(&filter.column)?;
    let label = format!("filter on {}", column);

    let values = match filter.op {
        FilterOp::IsNull | FilterOp::IsNotNull => {
            if !filter.value.is_null() {
                return Err(GatewayError::validation(format!(
                    "{}: '{}' takes no value",
                    label,
                    filter.op.as_str()
                )));
            }
            Vec::new()
        }
        FilterOp::In => {
            let items = match &filter.value {
                Value::Array(items) if !items.is_empty() => items,
                _ => {
                    return Err(GatewayError::validation(format!(
                        "{}: 'in' needs a non-empty array",
                        label
                    )))
                }
            };
            if items.len() > MAX_IN_VALUES {
                return Err(GatewayError::validation(format!(
                    "{}: 'in' accepts at most {} values",
                    label, MAX_IN_VALUES
                )));
            }
            items
                .iter()
                .map(|item| scalar(&label, item))
                .collect::<Result<_, _>>()?
        }
        FilterOp::Contains => vec![SqlParam::Text(contains_pattern(&like_text(
            &label,
            &filter.value,
        )?))],
        FilterOp::StartsWith => vec![SqlParam::Text(format!(
            "{}%",
            escape_like(&like_text(&label, &filter.value)?.to_lowercase())
        ))],
        FilterOp::Eq | FilterOp::Ne | FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
            vec![scalar(&label, &filter.value)?]
        }
    };

    Ok(CheckedFilter {
        column,
        op: filter.op,
        values,
    })
}

/// SQL comparison operator for the comparison subset of [`FilterOp`].
fn comparison(op: FilterOp) -> Option<&'static str> {
    match op {
        FilterOp::Eq => Some("="),
        FilterOp::Ne => Some("<>"),
        FilterOp::Lt => Some("<"),
        FilterOp::Le => Some("<="),
        FilterOp::Gt => Some(">"),
        FilterOp::Ge => Some(">="),
        _ => None,
    }
}

impl CheckedFilter {
    fn render(&self, table: &ResolvedTable, params: &mut Params) -> Result<String, GatewayError> {
        let column = table.column(&self.column)?;
        if !column.class.comparable() {
            return Err(GatewayError::validation(format!(
                "Column {} ({}) cannot be filtered",
                column.name, column.data_type
            )));
        }
        let quoted = column.quoted();
        let mut values = self.values.iter().cloned().map(|v| params.push(v));

        let sql = match self.op {
            FilterOp::IsNull => format!("{} IS NULL", quoted),
            FilterOp::IsNotNull => format!("{} IS NOT NULL", quoted),
            FilterOp::In => format!("{} IN ({})", quoted, values.collect::<Vec<_>>().join(", ")),
            FilterOp::Contains | FilterOp::StartsWith => format!(
                "LOWER({}) LIKE {}",
                quoted,
                values.next().unwrap_or_default()
            ),
            op => format!(
                "{} {} {}",
                quoted,
                comparison(op).unwrap_or("="),
                values.next().unwrap_or_default()
            ),
        };
        Ok(sql)
    }
}

/// ` WHERE a AND b`, or nothing without filters.
fn where_clause(
    filters: &[CheckedFilter],
    table: &ResolvedTable,
    params: &mut Params,
) -> Result<String, GatewayError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let predicates = filters
        .iter()
        .map(|f| f.render(table, params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

/// `Column`, `Column ASC` or `Column DESC`.
fn parse_sort(raw: &str) -> Result<(String, &'static str), GatewayError> {
    let trimmed = raw.trim();
    let (column, direction) = match trimmed.rsplit_once(char::is_whitespace) {
        Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => (column, "DESC"),
        Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => (column, "ASC"),
        _ => (trimmed, "ASC"),
    };
    Ok((requested_column(column)?, direction))
}

/// An aggregate whose shape has been checked; the alias is final.
struct CheckedAggregate {
    function: AggregateFn,
    column: Option<String>,
    alias: Option<String>,
}

fn check_aggregate(aggregate: &Aggregate) -> Result<CheckedAggregate, GatewayError> {
    let column = aggregate.column.as_deref().map(requested_column).transpose()?;
    if column.is_none() && aggregate.function != AggregateFn::Count {
        return Err(GatewayError::validation(format!(
            "Aggregate '{}' needs a column",
            aggregate.function.as_str()
        )));
    }
    let alias = aggregate.alias.as_deref().map(requested_column).transpose()?;
    Ok(CheckedAggregate {
        function: aggregate.function,
        column,
        alias,
    })
}

struct RenderedAggregate {
    expression: String,
    alias: String,
}

impl CheckedAggregate {
    fn render(&self, table: &ResolvedTable) -> Result<RenderedAggregate, GatewayError> {
        let Some(requested) = &self.column else {
            return Ok(RenderedAggregate {
                expression: "COUNT_BIG(*)".to_string(),
                alias: self.alias.clone().unwrap_or_else(|| "row_count".to_string()),
            });
        };

        let column = table.column(requested)?;
        let allowed = match self.function {
            AggregateFn::Count | AggregateFn::CountDistinct => column.class.comparable(),
            AggregateFn::Sum | AggregateFn::Avg => column.class == ColumnClass::Numeric,
            AggregateFn::Min | AggregateFn::Max => column.class.ordered(),
        };
        if !allowed {
            return Err(GatewayError::validation(format!(
                "Aggregate '{}' does not apply to {} ({})",
                self.function.as_str(),
                column.name,
                column.data_type
            )));
        }

        let quoted = column.quoted();
        let expression = match self.function {
            AggregateFn::Count => format!("COUNT_BIG({})", quoted),
            AggregateFn::CountDistinct => format!("COUNT_BIG(DISTINCT {})", quoted),
            AggregateFn::Sum => format!("SUM({})", quoted),
            AggregateFn::Avg => format!("AVG(CAST({} AS FLOAT))", quoted),
            AggregateFn::Min => format!("MIN({})", quoted),
            AggregateFn::Max => format!("MAX({})", quoted),
        };
        let alias = self
            .alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.function.as_str(), column.name));
        Ok(RenderedAggregate { expression, alias })
    }
}

fn check_having(condition: &HavingCondition) -> Result<(String, &'static str, SqlParam), GatewayError> {
    let op = comparison(condition.op).ok_or_else(|| {
        GatewayError::validation(format!(
            "HAVING supports eq, ne, lt, le, gt and ge, got '{}'",
            condition.op.as_str()
        ))
    })?;
    let value = match scalar("having value", &condition.value)? {
        param @ (SqlParam::Int(_) | SqlParam::Float(_)) => param,
        _ => {
            return Err(GatewayError::validation(
                "HAVING thresholds must be numbers",
            ))
        }
    };
    Ok((requested_column(&condition.aggregate)?, op, value))
}

/// Build one profiling row's statistics statement for a column.
fn profile_statement(table: &ResolvedTable, column: &CatalogColumn) -> Statement {
    let c = column.quoted();
    let counts = if column.class == ColumnClass::Large {
        format!(
            "COUNT_BIG(*) AS total_count, \
             COUNT_BIG(*) - ISNULL(SUM(CASE WHEN {c} IS NULL THEN 1 ELSE 0 END), 0) AS non_null_count, \
             ISNULL(SUM(CASE WHEN {c} IS NULL THEN 1 ELSE 0 END), 0) AS null_count",
            c = c
        )
    } else {
        format!(
            "COUNT_BIG(*) AS total_count, COUNT_BIG({c}) AS non_null_count, \
             COUNT_BIG(*) - COUNT_BIG({c}) AS null_count, \
             COUNT_BIG(DISTINCT {c}) AS distinct_count",
            c = c
        )
    };
    let extra = match column.class {
        ColumnClass::Numeric => format!(
            ", MIN({c}) AS min_value, MAX({c}) AS max_value, AVG(CAST({c} AS FLOAT)) AS avg_value",
            c = c
        ),
        ColumnClass::Text => format!(
            ", MIN(LEN({c})) AS min_length, MAX(LEN({c})) AS max_length, \
             AVG(CAST(LEN({c}) AS FLOAT)) AS avg_length",
            c = c
        ),
        ColumnClass::Temporal => format!(", MIN({c}) AS min_value, MAX({c}) AS max_value", c = c),
        ColumnClass::Large | ColumnClass::Other => String::new(),
    };
    Statement::new(format!("SELECT {}{} FROM {}", counts, extra, table.quoted()))
}

fn top_values_statement(table: &ResolvedTable, column: &CatalogColumn) -> Statement {
    let c = column.quoted();
    Statement::new(format!(
        "SELECT TOP (@P1) {c} AS value, COUNT_BIG(*) AS frequency FROM {t} \
         WHERE {c} IS NOT NULL GROUP BY {c} ORDER BY COUNT_BIG(*) DESC",
        c = c,
        t = table.quoted()
    ))
    .bind(SqlParam::Int(PROFILE_TOP_VALUES))
}

impl Gateway {
    /// Rows matching every filter, optionally sorted by one column.
    pub async fn advanced_search(
        &self,
        args: &AdvancedSearchArgs,
    ) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", args.limit, self.config.limits.advanced_search)?;
        let table = parse_table_name(&args.table_name)?;
        let filters = check_filters(&args.filters)?;
        let sort = args.sort_by.as_deref().map(parse_sort).transpose()?;

        let mut session = self.session().await?;
        let resolved = ResolvedTable::load(session.as_mut(), &table).await?;

        let mut params = Params::default();
        let top = params.push(SqlParam::Int(limit));
        let predicate = where_clause(&filters, &resolved, &mut params)?;
        let order = match &sort {
            Some((requested, direction)) => {
                let column = resolved.column(requested)?;
                if !column.class.comparable() {
                    return Err(GatewayError::validation(format!(
                        "Cannot sort by {} ({})",
                        column.name, column.data_type
                    )));
                }
                format!(" ORDER BY {} {}", column.quoted(), direction)
            }
            None => String::new(),
        };

        let statement = params
            .into_statement(format!(
                "SELECT TOP ({}) * FROM {}{}{}",
                top,
                resolved.quoted(),
                predicate,
                order
            ))
            .with_max_rows(limit as usize);
        let result = session.query(&statement).await?;

        let found = result.row_count;
        Ok(result.with_metadata(json!({
            "table": resolved.display_name(),
            "filters": args.filters,
            "found": found,
        })))
    }

    /// Rows whose numeric or date column lies within an inclusive range.
    pub async fn range_search(&self, args: &RangeSearchArgs) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", args.limit, self.config.limits.range_search)?;
        let table = parse_table_name(&args.table_name)?;
        let requested = requested_column(&args.column)?;
        let min = scalar("min_value", &args.min_value)?;
        let max = scalar("max_value", &args.max_value)?;
        if let (Some(lo), Some(hi)) = (args.min_value.as_f64(), args.max_value.as_f64()) {
            if lo > hi {
                return Err(GatewayError::validation(format!(
                    "min_value ({}) must not exceed max_value ({})",
                    lo, hi
                )));
            }
        }
        let filters = check_filters(&args.filters)?;

        let mut session = self.session().await?;
        let resolved = ResolvedTable::load(session.as_mut(), &table).await?;

        let column = resolved.column(&requested)?;
        if !matches!(column.class, ColumnClass::Numeric | ColumnClass::Temporal) {
            return Err(GatewayError::validation(format!(
                "range_search needs a numeric or date column; {} is {}",
                column.name, column.data_type
            )));
        }

        let mut params = Params::default();
        let top = params.push(SqlParam::Int(limit));
        let mut predicates = vec![format!(
            "{} BETWEEN {} AND {}",
            column.quoted(),
            params.push(min),
            params.push(max)
        )];
        for filter in &filters {
            predicates.push(filter.render(&resolved, &mut params)?);
        }

        let statement = params
            .into_statement(format!(
                "SELECT TOP ({}) * FROM {} WHERE {} ORDER BY {}",
                top,
                resolved.quoted(),
                predicates.join(" AND "),
                column.quoted()
            ))
            .with_max_rows(limit as usize);
        let result = session.query(&statement).await?;

        let found = result.row_count;
        Ok(result.with_metadata(json!({
            "table": resolved.display_name(),
            "range_column": column.name,
            "range": {"min": args.min_value, "max": args.max_value},
            "found": found,
        })))
    }

    /// Null counts, distinct counts, value or length ranges and the most
    /// frequent values of each column.
    pub async fn data_profiling(
        &self,
        args: &DataProfilingArgs,
    ) -> Result<QueryResult, GatewayError> {
        let table = parse_table_name(&args.table_name)?;
        let requested = args
            .columns
            .iter()
            .map(|c| requested_column(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = self.session().await?;
        let resolved = ResolvedTable::load(session.as_mut(), &table).await?;
        if resolved.columns.is_empty() {
            return Err(GatewayError::not_found("Table", table.to_string()));
        }

        let selected: Vec<&CatalogColumn> = if requested.is_empty() {
            resolved.columns.iter().collect()
        } else {
            let mut selected: Vec<&CatalogColumn> = Vec::with_capacity(requested.len());
            for name in &requested {
                let column = resolved.column(name)?;
                if !selected.iter().any(|c| c.name == column.name) {
                    selected.push(column);
                }
            }
            selected
        };

        let mut rows = Vec::with_capacity(selected.len());
        for column in selected {
            let stats = session.query(&profile_statement(&resolved, column)).await?;
            let statistics = stats.rows.into_iter().next().unwrap_or_default();

            let top_values = if column.class == ColumnClass::Large {
                Vec::new()
            } else {
                session
                    .query(&top_values_statement(&resolved, column))
                    .await?
                    .rows
                    .into_iter()
                    .map(Value::Object)
                    .collect()
            };

            let mut row = Map::new();
            row.insert("column_name".into(), json!(column.name));
            row.insert("data_type".into(), json!(column.data_type));
            row.insert("statistics".into(), Value::Object(statistics));
            row.insert("top_values".into(), Value::Array(top_values));
            rows.push(row);
        }

        let columns = vec![
            ColumnInfo::new("column_name", "nvarchar"),
            ColumnInfo::new("data_type", "nvarchar"),
            ColumnInfo::new("statistics", "json"),
            ColumnInfo::new("top_values", "json"),
        ];
        let profiled = rows.len();
        Ok(QueryResult::from_rows(columns, rows).with_metadata(json!({
            "table": resolved.display_name(),
            "profiled_columns": profiled,
        })))
    }

    /// Aggregates over a table, optionally grouped, filtered before grouping
    /// and filtered on the aggregates after grouping.
    pub async fn custom_aggregation(
        &self,
        args: &CustomAggregationArgs,
    ) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", args.limit, self.config.limits.aggregation_groups)?;
        let table = parse_table_name(&args.table_name)?;
        if args.aggregates.is_empty() {
            return Err(GatewayError::validation("At least one aggregate is required"));
        }
        if args.aggregates.len() > MAX_AGGREGATES || args.group_by.len() > MAX_AGGREGATES {
            return Err(GatewayError::validation(format!(
                "At most {} aggregates and {} grouping columns are allowed",
                MAX_AGGREGATES, MAX_AGGREGATES
            )));
        }
        if args.having.len() > MAX_FILTERS {
            return Err(GatewayError::validation(format!(
                "At most {} HAVING conditions are allowed",
                MAX_FILTERS
            )));
        }
        let group_by = args
            .group_by
            .iter()
            .map(|c| requested_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        let aggregates = args
            .aggregates
            .iter()
            .map(check_aggregate)
            .collect::<Result<Vec<_>, _>>()?;
        let filters = check_filters(&args.filters)?;
        let having = args
            .having
            .iter()
            .map(check_having)
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = self.session().await?;
        let resolved = ResolvedTable::load(session.as_mut(), &table).await?;

        let mut group_columns: Vec<&CatalogColumn> = Vec::with_capacity(group_by.len());
        for name in &group_by {
            let column = resolved.column(name)?;
            if !column.class.comparable() {
                return Err(GatewayError::validation(format!(
                    "Cannot group by {} ({})",
                    column.name, column.data_type
                )));
            }
            group_columns.push(column);
        }

        let rendered = aggregates
            .iter()
            .map(|a| a.render(&resolved))
            .collect::<Result<Vec<_>, _>>()?;
        let mut names: Vec<String> = group_columns.iter().map(|c| c.name.to_lowercase()).collect();
        for aggregate in &rendered {
            let key = aggregate.alias.to_lowercase();
            if names.contains(&key) {
                return Err(GatewayError::validation(format!(
                    "Duplicate output column '{}'; give each aggregate a distinct alias",
                    aggregate.alias
                )));
            }
            names.push(key);
        }

        let mut params = Params::default();
        let top = params.push(SqlParam::Int(limit));

        let quoted_groups: Vec<String> = group_columns.iter().map(|c| c.quoted()).collect();
        let select_list = quoted_groups
            .iter()
            .cloned()
            .chain(
                rendered
                    .iter()
                    .map(|a| format!("{} AS {}", a.expression, quote_identifier(&a.alias))),
            )
            .collect::<Vec<_>>()
            .join(", ");

        let mut text = format!(
            "SELECT TOP ({}) {} FROM {}{}",
            top,
            select_list,
            resolved.quoted(),
            where_clause(&filters, &resolved, &mut params)?
        );
        if !quoted_groups.is_empty() {
            text.push_str(&format!(" GROUP BY {}", quoted_groups.join(", ")));
        }
        if !having.is_empty() {
            let mut conditions = Vec::with_capacity(having.len());
            for (alias, op, value) in having {
                let aggregate = rendered
                    .iter()
                    .find(|a| a.alias.to_lowercase() == alias.to_lowercase())
                    .ok_or_else(|| {
                        GatewayError::validation(format!(
                            "HAVING refers to unknown aggregate '{}'",
                            alias
                        ))
                    })?;
                conditions.push(format!("{} {} {}", aggregate.expression, op, params.push(value)));
            }
            text.push_str(&format!(" HAVING {}", conditions.join(" AND ")));
        }
        if !quoted_groups.is_empty() {
            text.push_str(&format!(" ORDER BY {}", quoted_groups.join(", ")));
        }

        let statement = params
            .into_statement(text)
            .with_max_rows(limit as usize);
        let result = session.query(&statement).await?;

        let found = result.row_count;
        Ok(result.with_metadata(json!({
            "table": resolved.display_name(),
            "group_by": group_columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "aggregates": rendered.iter().map(|a| a.alias.as_str()).collect::<Vec<_>>(),
            "found": found,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{gateway_with, rows, FakeBackend};
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::ToolInvocation;

    const ORDERS: &[(&str, &str)] = &[
        ("OrderID", "int"),
        ("CustomerID", "nchar"),
        ("EmployeeID", "int"),
        ("OrderDate", "datetime"),
        ("ShipVia", "int"),
        ("Freight", "money"),
        ("ShipCountry", "nvarchar"),
    ];

    const CATEGORIES: &[(&str, &str)] = &[
        ("CategoryID", "int"),
        ("CategoryName", "nvarchar"),
        ("Description", "ntext"),
        ("Picture", "image"),
    ];

    /// Catalog with Orders and Categories; data statements get one row.
    fn northwind() -> FakeBackend {
        FakeBackend::new(|statement| {
            let table = statement.params.iter().find_map(|p| match p {
                SqlParam::Text(name) if name == "Orders" => Some(("Orders", ORDERS)),
                SqlParam::Text(name) if name == "Categories" => Some(("Categories", CATEGORIES)),
                _ => None,
            });
            if statement.text.contains("INFORMATION_SCHEMA.TABLES") {
                return Ok(match table {
                    Some((name, _)) => rows(vec![json!({"schema": "dbo", "name": name})]),
                    None => QueryResult::empty(),
                });
            }
            if statement.text.contains("INFORMATION_SCHEMA.COLUMNS") {
                let columns = table.map(|(_, columns)| columns).unwrap_or_default();
                return Ok(rows(
                    columns
                        .iter()
                        .map(|(name, ty)| json!({"column_name": name, "data_type": ty}))
                        .collect(),
                ));
            }
            if statement.text.contains("AS frequency") {
                return Ok(rows(vec![json!({"value": 1, "frequency": 3})]));
            }
            if statement.text.contains("AS total_count") {
                return Ok(rows(vec![json!({"total_count": 8, "non_null_count": 8, "null_count": 0})]));
            }
            Ok(rows(vec![json!({"OrderID": 10248})]))
        })
    }

    fn filter(column: &str, op: FilterOp, value: Value) -> Filter {
        Filter {
            column: column.to_string(),
            op,
            value,
        }
    }

    fn search(filters: Vec<Filter>) -> AdvancedSearchArgs {
        AdvancedSearchArgs {
            table_name: "Orders".into(),
            filters,
            sort_by: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_advanced_search_binds_values_and_quotes_catalog_names() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let mut args = search(vec![
            filter("shipcountry", FilterOp::Eq, json!("Germany")),
            filter("[Freight]", FilterOp::Gt, json!(50.5)),
            filter("CustomerID", FilterOp::In, json!(["ALFKI", "ANATR"])),
            filter("ShipCountry", FilterOp::Contains, json!("Ger_")),
            filter("EmployeeID", FilterOp::IsNotNull, Value::Null),
        ]);
        args.sort_by = Some("orderdate desc".into());

        let result = gateway.advanced_search(&args).await.unwrap();
        assert_eq!(result.metadata.as_ref().unwrap()["found"], 1);

        let statement = backend.last_statement();
        assert_eq!(
            statement.text,
            "SELECT TOP (@P1) * FROM [dbo].[Orders] WHERE [ShipCountry] = @P2 \
             AND [Freight] > @P3 AND [CustomerID] IN (@P4, @P5) \
             AND LOWER([ShipCountry]) LIKE @P6 AND [EmployeeID] IS NOT NULL \
             ORDER BY [OrderDate] DESC"
        );
        assert_eq!(
            statement.params,
            vec![
                SqlParam::Int(20),
                SqlParam::Text("Germany".into()),
                SqlParam::Float(50.5),
                SqlParam::Text("ALFKI".into()),
                SqlParam::Text("ANATR".into()),
                SqlParam::Text("%ger[_]%".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_filter_values_never_reach_statement_text() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        gateway
            .advanced_search(&search(vec![filter(
                "ShipCountry",
                FilterOp::Eq,
                json!("x' OR '1'='1"),
            )]))
            .await
            .unwrap();
        let statement = backend.last_statement();
        assert!(!statement.text.contains("OR '1'"));
        assert_eq!(statement.params[1], SqlParam::Text("x' OR '1'='1".into()));
    }

    #[tokio::test]
    async fn test_unknown_column_is_not_found_and_never_spliced() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let err = gateway
            .invoke(ToolInvocation::AdvancedSearch(search(vec![filter(
                "1=1 OR ShipCountry",
                FilterOp::Eq,
                json!("x"),
            )])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // table and column lookups only
        assert_eq!(backend.statements().len(), 2);
        assert_eq!(gateway.gate_status().in_use, 0);
    }

    #[tokio::test]
    async fn test_malformed_filters_rejected_before_acquire() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let too_many = (0..=MAX_FILTERS)
            .map(|i| filter("OrderID", FilterOp::Ne, json!(i)))
            .collect();
        let cases = vec![
            search(vec![filter("ShipCountry; DROP TABLE Orders", FilterOp::Eq, json!("x"))]),
            search(vec![filter("ShipCountry--", FilterOp::Eq, json!("x"))]),
            search(vec![filter("CustomerID", FilterOp::In, json!("ALFKI"))]),
            search(vec![filter("CustomerID", FilterOp::In, json!([]))]),
            search(vec![filter("ShipVia", FilterOp::IsNull, json!(1))]),
            search(vec![filter("ShipVia", FilterOp::Eq, Value::Null)]),
            search(vec![filter("ShipVia", FilterOp::Eq, json!({"nested": 1}))]),
            search(too_many),
            AdvancedSearchArgs {
                limit: Some(201),
                ..search(Vec::new())
            },
            AdvancedSearchArgs {
                sort_by: Some("OrderDate; DROP TABLE Orders".into()),
                ..search(Vec::new())
            },
        ];

        for args in cases {
            let err = gateway
                .invoke(ToolInvocation::AdvancedSearch(args.clone()))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", args);
        }
        assert_eq!(backend.acquires(), 0);
    }

    #[tokio::test]
    async fn test_range_search_between_with_extra_filters() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let result = gateway
            .range_search(&RangeSearchArgs {
                table_name: "dbo.Orders".into(),
                column: "OrderDate".into(),
                min_value: json!("1997-01-01"),
                max_value: json!("1997-03-31"),
                filters: vec![filter("ShipVia", FilterOp::Eq, json!(1))],
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(result.metadata.as_ref().unwrap()["range_column"], "OrderDate");

        let statement = backend.last_statement();
        assert_eq!(
            statement.text,
            "SELECT TOP (@P1) * FROM [dbo].[Orders] WHERE [OrderDate] BETWEEN @P2 AND @P3 \
             AND [ShipVia] = @P4 ORDER BY [OrderDate]"
        );
        assert_eq!(
            statement.params,
            vec![
                SqlParam::Int(50),
                SqlParam::Text("1997-01-01".into()),
                SqlParam::Text("1997-03-31".into()),
                SqlParam::Int(1),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_search_rejects_text_columns_and_inverted_bounds() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());
        let args = |column: &str, min: Value, max: Value| RangeSearchArgs {
            table_name: "Orders".into(),
            column: column.into(),
            min_value: min,
            max_value: max,
            filters: Vec::new(),
            limit: None,
        };

        let err = gateway
            .range_search(&args("Freight", json!(100), json!(10)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.acquires(), 0);

        let err = gateway
            .range_search(&args("ShipCountry", json!("A"), json!("M")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(gateway.gate_status().in_use, 0);
    }

    #[tokio::test]
    async fn test_data_profiling_adapts_to_column_types() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let result = gateway
            .data_profiling(&DataProfilingArgs {
                table_name: "Categories".into(),
                columns: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(result.row_count, 4);
        assert_eq!(result.rows[0]["column_name"], "CategoryID");
        assert_eq!(result.rows[0]["statistics"]["total_count"], 8);
        assert_eq!(result.rows[0]["top_values"][0]["frequency"], 3);
        assert_eq!(result.rows[2]["top_values"], json!([]));

        let statements = backend.statements();
        // two catalog lookups, two statements per ordinary column, one per large column
        assert_eq!(statements.len(), 2 + 2 + 2 + 1 + 1);
        assert!(statements[2].text.contains("AVG(CAST([CategoryID] AS FLOAT))"));
        assert!(statements[4].text.contains("MAX(LEN([CategoryName]))"));
        let description = &statements[6].text;
        assert!(description.contains("[Description] IS NULL"));
        assert!(!description.contains("DISTINCT"));
        assert_eq!(statements[3].params, vec![SqlParam::Int(PROFILE_TOP_VALUES)]);
    }

    #[tokio::test]
    async fn test_data_profiling_selected_and_unknown_columns() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let result = gateway
            .data_profiling(&DataProfilingArgs {
                table_name: "Orders".into(),
                columns: vec!["Freight".into(), "freight".into()],
            })
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["data_type"], "money");

        let err = gateway
            .data_profiling(&DataProfilingArgs {
                table_name: "Orders".into(),
                columns: vec!["Nope".into()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    fn aggregation() -> CustomAggregationArgs {
        CustomAggregationArgs {
            table_name: "Orders".into(),
            group_by: vec!["ShipCountry".into()],
            aggregates: vec![
                Aggregate {
                    function: AggregateFn::Sum,
                    column: Some("Freight".into()),
                    alias: Some("total_freight".into()),
                },
                Aggregate {
                    function: AggregateFn::Count,
                    column: None,
                    alias: None,
                },
                Aggregate {
                    function: AggregateFn::Avg,
                    column: Some("freight".into()),
                    alias: None,
                },
            ],
            filters: vec![filter("ShipVia", FilterOp::Eq, json!(1))],
            having: vec![HavingCondition {
                aggregate: "total_freight".into(),
                op: FilterOp::Gt,
                value: json!(100),
            }],
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_custom_aggregation_statement() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let result = gateway.custom_aggregation(&aggregation()).await.unwrap();
        assert_eq!(
            result.metadata.as_ref().unwrap()["aggregates"],
            json!(["total_freight", "row_count", "avg_Freight"])
        );

        let statement = backend.last_statement();
        assert_eq!(
            statement.text,
            "SELECT TOP (@P1) [ShipCountry], SUM([Freight]) AS [total_freight], \
             COUNT_BIG(*) AS [row_count], AVG(CAST([Freight] AS FLOAT)) AS [avg_Freight] \
             FROM [dbo].[Orders] WHERE [ShipVia] = @P2 GROUP BY [ShipCountry] \
             HAVING SUM([Freight]) > @P3 ORDER BY [ShipCountry]"
        );
        assert_eq!(
            statement.params,
            vec![SqlParam::Int(100), SqlParam::Int(1), SqlParam::Int(100)]
        );
    }

    #[tokio::test]
    async fn test_custom_aggregation_rejects_unsafe_shapes() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let mut no_aggregates = aggregation();
        no_aggregates.aggregates.clear();
        let mut bad_having_op = aggregation();
        bad_having_op.having[0].op = FilterOp::Contains;
        let mut text_threshold = aggregation();
        text_threshold.having[0].value = json!("100) OR (1=1");
        let mut sum_needs_column = aggregation();
        sum_needs_column.aggregates[0].column = None;

        for args in [no_aggregates, bad_having_op, text_threshold, sum_needs_column] {
            let err = gateway.custom_aggregation(&args).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(backend.acquires(), 0);

        let mut sum_of_text = aggregation();
        sum_of_text.aggregates[0].column = Some("ShipCountry".into());
        let mut unknown_having = aggregation();
        unknown_having.having[0].aggregate = "missing".into();
        let mut duplicate_alias = aggregation();
        duplicate_alias.aggregates[0].alias = Some("shipcountry".into());

        for args in [sum_of_text, unknown_having, duplicate_alias] {
            let err = gateway.custom_aggregation(&args).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(gateway.gate_status().in_use, 0);
    }
}
