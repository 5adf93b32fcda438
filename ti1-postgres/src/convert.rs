use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
use sqlx::postgres::{PgArguments, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};
use std::net::IpAddr;
use std::str::FromStr;
use ti1_core::{float_number, Arg, RawCell, Result, Ti1Error};
use tracing::warn;
use uuid::Uuid;

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Bind `arg` as the type the server inferred for its placeholder.
///
/// Request values arrive as text, so they are converted here the way PostgreSQL
/// would coerce an untyped literal. Unknown or text-like types are bound as text.
pub(crate) fn bind_arg<'q>(
    query: PgQuery<'q>,
    arg: &Arg,
    expected: Option<&PgTypeInfo>,
) -> Result<PgQuery<'q>> {
    let type_name = expected.map_or("TEXT", |t| t.name());
    let text = match arg {
        Arg::Text(s) => s.clone(),
        Arg::Int(n) => n.to_string(),
    };
    let query = match type_name {
        "INT2" => query.bind(parse_arg::<i16>(&text, type_name)?),
        "INT4" => query.bind(parse_arg::<i32>(&text, type_name)?),
        "INT8" => query.bind(parse_arg::<i64>(&text, type_name)?),
        "FLOAT4" => query.bind(parse_arg::<f32>(&text, type_name)?),
        "FLOAT8" => query.bind(parse_arg::<f64>(&text, type_name)?),
        "NUMERIC" => query.bind(parse_arg::<Decimal>(&text, type_name)?),
        "BOOL" => query.bind(parse_bool(&text)?),
        _ => query.bind(text),
    };
    Ok(query)
}

fn parse_arg<T: FromStr>(text: &str, type_name: &str) -> Result<T> {
    text.trim().parse().map_err(|_| {
        Ti1Error::Query(format!(
            "invalid input syntax for type {type_name}: {text:?}"
        ))
    })
}

fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(Ti1Error::Query(format!(
            "invalid input syntax for type BOOL: {text:?}"
        ))),
    }
}

pub(crate) fn row_cells(row: &PgRow) -> Result<Vec<RawCell>> {
    row.columns()
        .iter()
        .map(|column| decode_cell(row, column.ordinal(), column.type_info()))
        .collect()
}

// Results arrive in the binary wire format, so every type needs its own decoder.
// Only BYTEA is passed on as bytes.
fn decode_cell(row: &PgRow, index: usize, ty: &PgTypeInfo) -> Result<RawCell> {
    let cell = match ty.name() {
        "BOOL" => get::<bool>(row, index)?.map(RawCell::Bool),
        "INT2" => get::<i16>(row, index)?.map(|v| RawCell::Int(v.into())),
        "INT4" => get::<i32>(row, index)?.map(|v| RawCell::Int(v.into())),
        "INT8" => get::<i64>(row, index)?.map(RawCell::Int),
        "OID" => get::<Oid>(row, index)?.map(|v| RawCell::Int(v.0.into())),
        "FLOAT4" => get::<f32>(row, index)?.map(|v| RawCell::Float(v.into())),
        "FLOAT8" => get::<f64>(row, index)?.map(RawCell::Float),
        "NUMERIC" => get::<Decimal>(row, index)?.map(|v| RawCell::Text(v.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => get::<String>(row, index)?.map(RawCell::Text),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index)?.map(RawCell::Json),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index)?
            .map(|v| RawCell::Text(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index)?
            .map(|v| RawCell::Text(v.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        "DATE" => get::<NaiveDate>(row, index)?.map(|v| RawCell::Text(v.to_string())),
        "TIME" => get::<NaiveTime>(row, index)?.map(|v| RawCell::Text(v.to_string())),
        "TIMETZ" => get::<PgTimeTz<NaiveTime, FixedOffset>>(row, index)?
            .map(|v| RawCell::Text(format!("{}{}", v.time, format_offset(v.offset)))),
        "INTERVAL" => get::<PgInterval>(row, index)?.map(|v| RawCell::Text(format_interval(&v))),
        "UUID" => get::<Uuid>(row, index)?.map(|v| RawCell::Text(v.to_string())),
        "INET" | "CIDR" => raw(row, index)?
            .map(|bytes| format_inet(bytes).map(RawCell::Text))
            .transpose()?,
        "BYTEA" => get::<Vec<u8>>(row, index)?.map(RawCell::Bytes),
        "BOOL[]" => array::<bool>(row, index, Value::Bool)?,
        "INT2[]" => array::<i16>(row, index, Value::from)?,
        "INT4[]" => array::<i32>(row, index, Value::from)?,
        "INT8[]" => array::<i64>(row, index, Value::from)?,
        "FLOAT4[]" => array::<f32>(row, index, |v| float_json(v.into()))?,
        "FLOAT8[]" => array::<f64>(row, index, float_json)?,
        "NUMERIC[]" => array::<Decimal>(row, index, |v| Value::String(v.to_string()))?,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array::<String>(row, index, Value::String)?
        }
        "UUID[]" => array::<Uuid>(row, index, |v| Value::String(v.to_string()))?,
        name => match ty.kind() {
            // Enum values are sent as their label.
            PgTypeKind::Enum(_) => raw(row, index)?
                .map(|bytes| {
                    std::str::from_utf8(bytes)
                        .map(|label| RawCell::Text(label.to_string()))
                        .map_err(|e| Ti1Error::Scan(e.to_string()))
                })
                .transpose()?,
            _ => {
                warn!(
                    column = index,
                    type_name = name,
                    "unsupported column type, projected as null"
                );
                None
            }
        },
    };
    Ok(cell.unwrap_or(RawCell::Null))
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|e| Ti1Error::Scan(e.to_string()))
}

/// One-dimensional array as a JSON array; NULL elements stay null.
fn array<'r, T>(
    row: &'r PgRow,
    index: usize,
    to_json: impl Fn(T) -> Value,
) -> Result<Option<RawCell>>
where
    Vec<Option<T>>: Decode<'r, Postgres> + Type<Postgres>,
{
    Ok(get::<Vec<Option<T>>>(row, index)?.map(|items| {
        RawCell::Json(Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &to_json))
                .collect(),
        ))
    }))
}

fn float_json(v: f64) -> Value {
    float_number(v).map_or(Value::Null, Value::Number)
}

fn raw(row: &PgRow, index: usize) -> Result<Option<&[u8]>> {
    let value = row
        .try_get_raw(index)
        .map_err(|e| Ti1Error::Scan(e.to_string()))?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_bytes()
        .map(Some)
        .map_err(|e| Ti1Error::Scan(e.to_string()))
}

/// PostgreSQL's default interval output: `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    for (n, unit) in [
        (interval.months / 12, "year"),
        (interval.months % 12, "mon"),
        (interval.days, "day"),
    ] {
        if n != 0 {
            let plural = if n == 1 { "" } else { "s" };
            parts.push(format!("{n} {unit}{plural}"));
        }
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// UTC offset the way PostgreSQL prints it: `+02`, `-03:30`.
fn format_offset(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.unsigned_abs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    match (minutes, seconds) {
        (0, 0) => format!("{sign}{hours:02}"),
        (_, 0) => format!("{sign}{hours:02}:{minutes:02}"),
        _ => format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"),
    }
}

// Wire layout: family, prefix bits, is_cidr, address length, address bytes.
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// INET/CIDR in PostgreSQL's text form: the prefix is shown for CIDR values and
/// for INET values narrower than a single host.
fn format_inet(bytes: &[u8]) -> Result<String> {
    let malformed = || Ti1Error::Scan(format!("malformed inet value: {bytes:?}"));
    let [family, bits, is_cidr, len, addr @ ..] = bytes else {
        return Err(malformed());
    };
    if usize::from(*len) != addr.len() {
        return Err(malformed());
    }
    let (ip, host_bits) = match *family {
        PGSQL_AF_INET => {
            let octets: [u8; 4] = addr.try_into().map_err(|_| malformed())?;
            (IpAddr::from(octets), 32)
        }
        PGSQL_AF_INET6 => {
            let octets: [u8; 16] = addr.try_into().map_err(|_| malformed())?;
            (IpAddr::from(octets), 128)
        }
        _ => return Err(malformed()),
    };
    if *is_cidr != 0 || *bits != host_bits {
        Ok(format!("{ip}/{bits}"))
    } else {
        Ok(ip.to_string())
    }
}
