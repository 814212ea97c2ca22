//! SQL Server value normalization into JSON.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use tiberius::{ColumnData, FromSql};

/// Type mapper for converting TDS column data into JSON values.
pub struct TypeMapper;

impl TypeMapper {
    /// Convert one column value into JSON.
    ///
    /// Dates and times become ISO-8601 strings, GUIDs and XML become strings,
    /// binary data becomes a `0x`-prefixed hex string. Anything the driver
    /// cannot decode maps to `null`.
    pub fn to_json(data: &ColumnData<'static>) -> Value {
        match data {
            ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
            ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
            ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
            ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
            ColumnData::F32(v) => v.map(|f| float(f as f64)).unwrap_or(Value::Null),
            ColumnData::F64(v) => v.map(float).unwrap_or(Value::Null),
            ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
            ColumnData::String(v) => v
                .as_ref()
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Guid(v) => v
                .map(|g| Value::String(g.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Binary(v) => v
                .as_ref()
                .map(|b| Value::String(format!("0x{}", hex_encode(b))))
                .unwrap_or(Value::Null),
            ColumnData::Xml(v) => v
                .as_ref()
                .map(|x| Value::String(x.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Numeric(_) => decode::<Decimal>(data)
                .map(decimal)
                .unwrap_or(Value::Null),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                decode::<NaiveDateTime>(data)
                    .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                    .unwrap_or(Value::Null)
            }
            ColumnData::Date(_) => decode::<NaiveDate>(data)
                .map(|d| Value::String(d.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Time(_) => decode::<NaiveTime>(data)
                .map(|t| Value::String(t.to_string()))
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(_) => decode::<DateTime<FixedOffset>>(data)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            #[allow(unreachable_patterns)]
            _ => Value::Null,
        }
    }

    /// Get the SQL type name for a column.
    pub fn sql_type_name(col: &tiberius::Column) -> &'static str {
        use tiberius::ColumnType;

        match col.column_type() {
            ColumnType::Null => "NULL",
            ColumnType::Int1 => "TINYINT",
            ColumnType::Int2 => "SMALLINT",
            ColumnType::Int4 => "INT",
            ColumnType::Int8 => "BIGINT",
            ColumnType::Float4 => "REAL",
            ColumnType::Float8 => "FLOAT",
            ColumnType::Money => "MONEY",
            ColumnType::Money4 => "SMALLMONEY",
            ColumnType::Datetime => "DATETIME",
            ColumnType::Datetime4 => "SMALLDATETIME",
            ColumnType::Bit | ColumnType::Bitn => "BIT",
            ColumnType::Guid => "UNIQUEIDENTIFIER",
            ColumnType::Decimaln => "DECIMAL",
            ColumnType::Numericn => "NUMERIC",
            ColumnType::Intn => "INT",
            ColumnType::Floatn => "FLOAT",
            ColumnType::Datetimen => "DATETIME",
            ColumnType::Daten => "DATE",
            ColumnType::Timen => "TIME",
            ColumnType::Datetime2 => "DATETIME2",
            ColumnType::DatetimeOffsetn => "DATETIMEOFFSET",
            ColumnType::BigVarBin => "VARBINARY",
            ColumnType::BigVarChar => "VARCHAR",
            ColumnType::BigBinary => "BINARY",
            ColumnType::BigChar => "CHAR",
            ColumnType::NVarchar => "NVARCHAR",
            ColumnType::NChar => "NCHAR",
            ColumnType::Xml => "XML",
            ColumnType::Text => "TEXT",
            ColumnType::Image => "IMAGE",
            ColumnType::NText => "NTEXT",
            ColumnType::SSVariant => "SQL_VARIANT",
            _ => "UNKNOWN",
        }
    }
}

fn decode<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Option<T> {
    T::from_sql(data).ok().flatten()
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

// Exact integers stay integers; everything else goes through f64, falling
// back to the decimal's string form when it does not fit.
fn decimal(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    d.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
