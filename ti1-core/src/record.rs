use crate::{Result, Ti1Error};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// A cell as produced by the database driver, before projection.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// A column the driver already knows to be JSON/JSONB.
    Json(Value),
}

/// A projected cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Json(Value),
}

impl From<RawCell> for CellValue {
    fn from(cell: RawCell) -> Self {
        match cell {
            RawCell::Null => CellValue::Null,
            RawCell::Bool(b) => CellValue::Bool(b),
            RawCell::Int(n) => CellValue::Number(n.into()),
            RawCell::Float(f) => float_number(f).map_or(CellValue::Null, CellValue::Number),
            RawCell::Text(s) => classify_text(s),
            RawCell::Bytes(b) => classify_text(String::from_utf8_lossy(&b).into_owned()),
            RawCell::Json(v) => CellValue::Json(v),
        }
    }
}

// 2^53: every integer below this is exactly representable as f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// `f` as a JSON number. Whole values print without a fraction (`12`, not `12.0`);
/// NaN and the infinities have no JSON form and give `None`.
pub fn float_number(f: f64) -> Option<Number> {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT {
        Some(Number::from(f as i64))
    } else {
        Number::from_f64(f)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Number(n) => n.serialize(serializer),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Json(v) => v.serialize(serializer),
        }
    }
}

fn looks_like_json(text: &str) -> bool {
    let t = text.trim();
    (t.starts_with('{') && t.ends_with('}')) || (t.starts_with('[') && t.ends_with(']'))
}

/// Bracket-delimited text that parses as JSON becomes nested JSON; anything else
/// stays a string. This is a guess from content, so a plain string that happens to
/// be valid bracketed JSON is also reclassified.
fn classify_text(text: String) -> CellValue {
    if looks_like_json(&text) {
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return CellValue::Json(value);
        }
    }
    CellValue::Text(text)
}

/// Column names plus positionally aligned rows, as returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RowSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<RawCell>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn push_row(&mut self, row: Vec<RawCell>) {
        self.rows.push(row);
    }
}

/// A row keyed by column name that always serializes `id` first, then the
/// remaining keys in ascending byte order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedRecord {
    fields: HashMap<String, CellValue>,
}

impl OrderedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialization order, recomputed on every call.
    pub fn ordered_keys(&self) -> Vec<&str> {
        let mut rest: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|k| *k != "id")
            .collect();
        rest.sort_unstable();
        let mut keys = Vec::with_capacity(self.fields.len());
        if self.fields.contains_key("id") {
            keys.push("id");
        }
        keys.extend(rest);
        keys
    }

    pub fn to_ordered_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Ti1Error::Parse(e.to_string()))
    }
}

impl Serialize for OrderedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let keys = self.ordered_keys();
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            map.serialize_entry(key, &self.fields[key])?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for OrderedRecord {
    fn from_iter<T: IntoIterator<Item = (K, CellValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Project every row of `set` into an [`OrderedRecord`].
///
/// A row whose width differs from the column list fails the whole result.
pub fn project(set: RowSet) -> Result<Vec<OrderedRecord>> {
    let RowSet { columns, rows } = set;
    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(Ti1Error::Scan(format!(
                "row {idx} has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        records.push(
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(CellValue::from))
                .collect(),
        );
    }
    Ok(records)
}
