use crate::models::{ContextFlag, ContextFlags};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Sibling field written next to `heating_expenses_excluded`
pub const HEATING_COSTS: &str = "heating_costs";
/// Sibling field written next to `total_rent`
pub const TOTAL_RENT_ESTIMATED: &str = "total_rent_estimated";
/// Current floor, split out of the floor field
pub const STORY: &str = "story";
/// Number of floors in the building, split out of the floor field
pub const TOTAL_STORIES: &str = "total_stories";
/// Source listing URL, added to every record
pub const URL: &str = "url";
/// RFC 3339 time the listing was read, added to every record
pub const SCRAPED_AT: &str = "scraped_at";

/// How the raw text behind a selector becomes a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Text with whitespace runs collapsed
    Text,
    /// Text segments joined with ", "
    Address,
    /// Locale-formatted amount (`1.234,56 €`)
    Currency,
    /// "not included in additional costs" flag plus `heating_costs`
    HeatingFlag,
    /// Amount plus `total_rent_estimated` from a leading `~`
    TotalRent,
    /// "3 von 5" into `story` and `total_stories`
    FloorSplit,
    /// Trimmed text
    Default,
}

impl ParserKind {
    /// Parser used when a field declaration does not name one
    pub fn for_field(name: &str) -> Self {
        match name {
            "title" => ParserKind::Text,
            "address" => ParserKind::Address,
            "price" | "additional_costs" | "deposit" => ParserKind::Currency,
            "heating_expenses_excluded" => ParserKind::HeatingFlag,
            "total_rent" => ParserKind::TotalRent,
            "floor" => ParserKind::FloorSplit,
            _ => ParserKind::Default,
        }
    }

    /// Extra fields a parser writes next to the declared one
    pub fn derived_fields(self) -> &'static [&'static str] {
        match self {
            ParserKind::HeatingFlag => &[HEATING_COSTS],
            ParserKind::TotalRent => &[TOTAL_RENT_ESTIMATED],
            ParserKind::FloorSplit => &[STORY, TOTAL_STORIES],
            _ => &[],
        }
    }
}

/// Names written by the scraper itself; a declared field may not use them
fn is_reserved(name: &str) -> bool {
    [URL, SCRAPED_AT, HEATING_COSTS, TOTAL_RENT_ESTIMATED, STORY, TOTAL_STORIES].contains(&name)
        || ContextFlag::ALL.iter().any(|flag| flag.field_name() == name)
}

/// Historical German field names and their canonical English counterparts
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("nebenkosten", "additional_costs"),
    ("gesamtmiete", "total_rent"),
    ("kaution", "deposit"),
    ("etage", "floor"),
    ("heizkosten", "heating_expenses_excluded"),
];

pub fn canonical_field_name(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, canonical)| canonical)
}

/// Field declaration as written in the settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParserKind>,
}

impl FieldDef {
    pub fn new(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: None,
        }
    }
}

/// A resolved field: canonical name, selector and parser
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub selector: String,
    pub kind: ParserKind,
}

/// Ordered, immutable table driving listing extraction
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    fields: Vec<Field>,
}

impl FieldSpec {
    pub fn new(defs: &[FieldDef]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(defs.len());

        for def in defs {
            let name = canonical_field_name(def.name.trim()).to_string();
            if name.is_empty() {
                bail!("Field with selector '{}' has no name", def.selector);
            }
            if is_reserved(&name) {
                bail!("Field name '{}' is reserved for scraper output", name);
            }
            if !seen.insert(name.clone()) {
                bail!("Field '{}' is declared more than once", name);
            }
            let kind = def.kind.unwrap_or_else(|| ParserKind::for_field(&name));
            fields.push(Field {
                name,
                selector: def.selector.clone(),
                kind,
            });
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Whether extraction writes `name`, declared or derived
    pub fn produces(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.name == name || field.kind.derived_fields().contains(&name))
    }

    /// Names of fields holding amounts that post-processing re-parses
    pub fn currency_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|field| match field.kind {
            ParserKind::Currency | ParserKind::TotalRent => Some(field.name.as_str()),
            ParserKind::HeatingFlag => Some(HEATING_COSTS),
            _ => None,
        })
    }
}

/// Field map for immobilienscout24 expose pages
pub fn default_field_defs() -> Vec<FieldDef> {
    vec![
        FieldDef::new("title", "#expose-title"),
        FieldDef::new("price", ".is24qa-kaltmiete"),
        FieldDef::new("size", ".is24qa-flaeche-main"),
        FieldDef::new("rooms", ".is24qa-zimmer"),
        FieldDef::new("address", ".address-block"),
        FieldDef::new("additional_costs", ".is24qa-nebenkosten"),
        FieldDef::new("heating_expenses_excluded", ".is24qa-heizkosten"),
        FieldDef::new("total_rent", ".is24qa-gesamtmiete"),
        FieldDef::new("deposit", ".is24qa-kaution-o-genossenschaftsanteile"),
        FieldDef::new("floor", ".is24qa-etage"),
    ]
}

/// Where listings live on the target site and how result pages are laid out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Path prefix of expose pages
    pub listing_path: String,
    pub result_container: String,
    pub result_link: String,
    pub result_address: String,
    /// Query parameter carrying the result page number
    pub page_param: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.immobilienscout24.de".to_string(),
            listing_path: "/expose/".to_string(),
            result_container: "li.result-list__listing".to_string(),
            result_link: "a.result-list-entry__brand-title-container".to_string(),
            result_address: ".result-list-entry__map-link".to_string(),
            page_param: "pagenumber".to_string(),
        }
    }
}

/// One paginated search: seed URL plus the flags its filters imply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub url: String,
    pub flags: ContextFlags,
}

impl SearchConfig {
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid search URL: {url}"))?;
        Ok(Self {
            url: url.to_string(),
            flags: context_flags(&parsed),
        })
    }
}

/// Flags encoded in the `equipment` query parameter (comma separated, may repeat)
pub fn context_flags(url: &Url) -> ContextFlags {
    let mut flags = ContextFlags::new();
    for (key, value) in url.query_pairs() {
        if key != "equipment" {
            continue;
        }
        for item in value.split(',').filter(|item| !item.trim().is_empty()) {
            match ContextFlag::from_equipment(item) {
                Some(flag) => {
                    flags.insert(flag);
                }
                None => debug!("Ignoring unrecognized equipment filter '{}'", item),
            }
        }
    }
    flags
}
