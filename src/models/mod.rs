use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// Boolean context derived from the equipment filters of a search URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextFlag {
    Parking,
    Balcony,
    Garden,
    BuiltInKitchen,
    Lift,
}

impl ContextFlag {
    pub const ALL: [ContextFlag; 5] = [
        ContextFlag::Parking,
        ContextFlag::Balcony,
        ContextFlag::Garden,
        ContextFlag::BuiltInKitchen,
        ContextFlag::Lift,
    ];

    /// Field name used on output records
    pub fn field_name(self) -> &'static str {
        match self {
            ContextFlag::Parking => "parking",
            ContextFlag::Balcony => "balcony",
            ContextFlag::Garden => "garden",
            ContextFlag::BuiltInKitchen => "built_in_kitchen",
            ContextFlag::Lift => "lift",
        }
    }

    /// Value of the `equipment` search parameter that enables this flag
    pub fn from_equipment(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parking" => Some(ContextFlag::Parking),
            "balcony" => Some(ContextFlag::Balcony),
            "garden" => Some(ContextFlag::Garden),
            "builtinkitchen" => Some(ContextFlag::BuiltInKitchen),
            "lift" => Some(ContextFlag::Lift),
            _ => None,
        }
    }
}

pub type ContextFlags = BTreeSet<ContextFlag>;

/// A listing URL together with the flags of the search that found it.
/// Two links are the same only when both URL and flags match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingLink {
    pub url: String,
    pub flags: ContextFlags,
}

impl ListingLink {
    pub fn new(url: impl Into<String>, flags: ContextFlags) -> Self {
        Self {
            url: url.into(),
            flags,
        }
    }
}

/// Expose id of a listing URL, its last non-empty path segment
pub fn expose_id(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
}

/// Typed value of one record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Integer(i64),
    /// Extraction of this field failed; serialized as `"error"`
    Error,
}

impl FieldValue {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, FieldValue::Null | FieldValue::Error)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Number(number) => serializer.serialize_f64(*number),
            FieldValue::Bool(flag) => serializer.serialize_bool(*flag),
            FieldValue::Integer(number) => serializer.serialize_i64(*number),
            FieldValue::Error => serializer.serialize_str("error"),
        }
    }
}

/// One scraped listing: field name to value, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ListingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing the value in place if the name already exists
    pub fn set(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }
}

impl Serialize for ListingRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
