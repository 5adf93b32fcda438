use serde::Serialize;
use std::collections::BTreeMap;

/// Flattened query string: one value per key, the first one when repeated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut values = BTreeMap::new();
        if let Some(raw) = raw {
            for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
                values
                    .entry(key.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }
        Self(values)
    }

    /// The value for `key`, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
