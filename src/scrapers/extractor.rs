//! Field extraction for a single expose page.
//!
//! Every declared field ends up on the record: `Null` when its selector
//! matches nothing, `Error` when reading it failed. Amounts use German
//! formatting (`1.234,56`), so `.` is a thousands separator and `,` the
//! decimal separator.

use crate::error::ScoutResult;
use crate::models::{FieldValue, ListingRecord};
use crate::scrapers::document::{read_segments, read_text, PageDocument};
use crate::scrapers::types::{
    Field, FieldSpec, ParserKind, HEATING_COSTS, STORY, TOTAL_RENT_ESTIMATED, TOTAL_STORIES,
};
use tracing::{debug, warn};

/// Phrase marking heating costs as billed separately
const HEATING_EXCLUDED_PHRASE: &str = "nicht in nebenkosten enthalten";
/// Separator in "3 von 5", matched ignoring ASCII case
const FLOOR_SEPARATOR: &str = " von ";

/// Fields that must resolve for a record to be kept.
/// Required fields the active field map never writes are not enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessGate {
    required: Vec<String>,
}

impl CompletenessGate {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    /// Required names `spec` cannot produce
    pub fn unenforced<'a>(&'a self, spec: &'a FieldSpec) -> impl Iterator<Item = &'a str> {
        self.required
            .iter()
            .map(String::as_str)
            .filter(|name| !spec.produces(name))
    }

    /// First required field of `spec` that is missing, `null` or an error
    pub fn first_unresolved<'a>(&'a self, record: &ListingRecord, spec: &FieldSpec) -> Option<&'a str> {
        self.required
            .iter()
            .filter(|name| spec.produces(name))
            .find(|name| !record.get(name).is_some_and(FieldValue::is_resolved))
            .map(String::as_str)
    }
}

#[cfg(test)]
impl CompletenessGate {
    /// Keep every record
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }
}

impl Default for CompletenessGate {
    fn default() -> Self {
        Self::new(vec![STORY.to_string(), TOTAL_STORIES.to_string()])
    }
}

/// Extract all fields of `spec` from `page`.
/// Returns `None` when the record fails the completeness gate.
pub fn extract(page: &PageDocument, spec: &FieldSpec, gate: &CompletenessGate) -> Option<ListingRecord> {
    let mut record = ListingRecord::new();

    for field in spec.fields() {
        if let Err(e) = extract_field(page, field, &mut record) {
            warn!("Failed to extract '{}' ({}): {}", field.name, field.selector, e);
            mark_failed(field, &mut record);
        }
    }

    normalize(&mut record, spec);

    if let Some(missing) = gate.first_unresolved(&record, spec) {
        debug!("Dropping record, '{}' could not be resolved", missing);
        return None;
    }

    Some(record)
}

fn extract_field(page: &PageDocument, field: &Field, record: &mut ListingRecord) -> ScoutResult<()> {
    let Some(element) = page.query(&field.selector)? else {
        set_absent(field, record);
        return Ok(());
    };

    match field.kind {
        ParserKind::Text => {
            record.set(&field.name, FieldValue::Text(collapse_whitespace(&read_text(element))));
        }
        ParserKind::Default => {
            record.set(&field.name, FieldValue::Text(read_text(element)));
        }
        ParserKind::Address => {
            record.set(&field.name, FieldValue::Text(join_address(&read_segments(element))));
        }
        ParserKind::Currency => {
            record.set(&field.name, currency_value(&field.name, &read_text(element)));
        }
        ParserKind::HeatingFlag => {
            let text = read_text(element);
            let excluded = heating_excluded(&text);
            record.set(&field.name, FieldValue::Bool(excluded));
            let costs = if excluded {
                FieldValue::Null
            } else {
                currency_value(HEATING_COSTS, &text)
            };
            record.set(HEATING_COSTS, costs);
        }
        ParserKind::TotalRent => {
            let text = read_text(element);
            record.set(&field.name, currency_value(&field.name, &text));
            record.set(TOTAL_RENT_ESTIMATED, FieldValue::Bool(text.contains('~')));
        }
        ParserKind::FloorSplit => {
            let text = read_text(element);
            let (story, total) = split_floor(&text);
            record.set(&field.name, FieldValue::Text(text.clone()));
            record.set(STORY, FieldValue::Text(story));
            record.set(TOTAL_STORIES, total.map_or(FieldValue::Null, FieldValue::Text));
        }
    }
    Ok(())
}

/// The field and any siblings it owns, all `Null`
fn set_absent(field: &Field, record: &mut ListingRecord) {
    record.set(&field.name, FieldValue::Null);
    for sibling in field.kind.derived_fields() {
        record.set(sibling, FieldValue::Null);
    }
}

fn mark_failed(field: &Field, record: &mut ListingRecord) {
    record.set(&field.name, FieldValue::Error);
    for sibling in field.kind.derived_fields() {
        record.set(sibling, FieldValue::Error);
    }
}

/// Second pass over a record: amounts still held as text are parsed and
/// floor numbers become integers where possible. Safe to run repeatedly.
pub fn normalize(record: &mut ListingRecord, spec: &FieldSpec) {
    for name in spec.currency_fields() {
        if let Some(FieldValue::Text(text)) = record.get(name) {
            let value = currency_value(name, text);
            record.set(name, value);
        }
    }

    for name in [STORY, TOTAL_STORIES] {
        if let Some(FieldValue::Text(text)) = record.get(name) {
            if let Ok(number) = text.trim().parse::<i64>() {
                record.set(name, FieldValue::Integer(number));
            }
        }
    }
}

/// Parse a German formatted amount such as `"1.234,56 €"`.
///
/// Everything except digits, `,` and `.` is dropped first; nothing left means
/// there is no amount (`Ok(None)`).
pub fn parse_currency(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if kept.is_empty() {
        return Ok(None);
    }
    kept.replace('.', "").replace(',', ".").parse::<f64>().map(Some)
}

fn currency_value(name: &str, raw: &str) -> FieldValue {
    match parse_currency(raw) {
        Ok(value) => value.into(),
        Err(e) => {
            warn!("Could not parse amount '{}' for '{}': {}", raw, name, e);
            FieldValue::Null
        }
    }
}

pub fn heating_excluded(text: &str) -> bool {
    text.to_lowercase().contains(HEATING_EXCLUDED_PHRASE)
}

/// Split `"3 von 5"` into current floor and floor count
pub fn split_floor(text: &str) -> (String, Option<String>) {
    // the separator is ASCII, so both ends of a match are char boundaries
    let separator = FLOOR_SEPARATOR.as_bytes();
    let found = text
        .as_bytes()
        .windows(separator.len())
        .position(|window| window.eq_ignore_ascii_case(separator));
    match found {
        Some(at) => {
            let story = text[..at].trim().to_string();
            let total = text[at + separator.len()..].trim().to_string();
            (story, Some(total))
        }
        None => (text.trim().to_string(), None),
    }
}

/// Join text segments with ", ", dropping empty and repeated ones
pub fn join_address(segments: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in segments {
        let part = segment.trim().trim_end_matches(',').trim();
        if !part.is_empty() && !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(", ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
