use crate::scrapers::browser::ChromeOptions;
use crate::scrapers::extractor::CompletenessGate;
use crate::scrapers::interstitial::InterstitialSelectors;
use crate::scrapers::orchestrator::ScrapeLimits;
use crate::scrapers::session::LoadSettings;
use crate::scrapers::types::{
    default_field_defs, FieldDef, FieldSpec, SearchConfig, SiteConfig, STORY, TOTAL_STORIES,
};
use anyhow::{anyhow, bail, Context, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Everything a run needs, as read from the settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub site: SiteConfig,
    pub interstitials: InterstitialSelectors,
    /// Seed URLs, one paginated search each
    pub searches: Vec<String>,
    pub fields: Vec<FieldDef>,
    /// Fields a record must resolve to be kept; empty keeps everything
    pub required_fields: Vec<String>,
    /// Links collected per search
    pub limit: usize,
    pub max_retries: u32,
    pub page_load_timeout_secs: u64,
    pub selector_timeout_secs: u64,
    pub interstitial_timeout_secs: u64,
    pub settle_ms: u64,
    pub output: PathBuf,
    pub raw_dir: Option<PathBuf>,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            interstitials: InterstitialSelectors::default(),
            searches: vec![
                "https://www.immobilienscout24.de/Suche/de/berlin/berlin/wohnung-mieten".to_string(),
            ],
            fields: default_field_defs(),
            required_fields: vec![STORY.to_string(), TOTAL_STORIES.to_string()],
            limit: 150,
            max_retries: 3,
            page_load_timeout_secs: 30,
            selector_timeout_secs: 10,
            interstitial_timeout_secs: 300,
            settle_ms: 2000,
            output: PathBuf::from("listings.json"),
            raw_dir: None,
            headless: false,
            user_data_dir: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`; fields left out keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.site.base_url)
            .with_context(|| format!("Invalid base_url '{}'", self.site.base_url))?;
        if self.site.listing_path.is_empty() {
            bail!("site.listing_path must not be empty");
        }
        if self.searches.is_empty() {
            bail!("No searches configured");
        }
        if self.fields.is_empty() {
            bail!("No fields configured");
        }
        for (name, selector) in self.page_selectors() {
            if !selector.is_empty() {
                parse_selector(name, selector)?;
            }
        }
        let spec = self.field_spec()?;
        for field in spec.fields() {
            parse_selector(&field.name, &field.selector)?;
        }
        for name in self.completeness_gate().unenforced(&spec) {
            warn!("Required field '{}' is never extracted by the field map, ignoring it", name);
        }
        self.search_configs()?;
        Ok(())
    }

    /// Selectors used on every result page or for interstitial handling
    fn page_selectors(&self) -> [(&'static str, &str); 6] {
        [
            ("site.result_container", self.site.result_container.as_str()),
            ("site.result_link", self.site.result_link.as_str()),
            ("site.result_address", self.site.result_address.as_str()),
            ("interstitials.consent", self.interstitials.consent.as_str()),
            ("interstitials.consent_button", self.interstitials.consent_button.as_str()),
            ("interstitials.captcha", self.interstitials.captcha.as_str()),
        ]
    }

    pub fn field_spec(&self) -> Result<FieldSpec> {
        FieldSpec::new(&self.fields)
    }

    pub fn search_configs(&self) -> Result<Vec<SearchConfig>> {
        self.searches.iter().map(|url| SearchConfig::from_url(url)).collect()
    }

    pub fn completeness_gate(&self) -> CompletenessGate {
        CompletenessGate::new(self.required_fields.clone())
    }

    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            selector_timeout: Duration::from_secs(self.selector_timeout_secs),
            interstitial_timeout: Duration::from_secs(self.interstitial_timeout_secs),
            settle: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn limits(&self) -> ScrapeLimits {
        ScrapeLimits {
            per_search: self.limit,
            max_retries: self.max_retries,
        }
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            user_data_dir: self.user_data_dir.clone(),
            ..ChromeOptions::default()
        }
    }
}

fn parse_selector(name: &str, selector: &str) -> Result<()> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| anyhow!("Invalid selector for {name} '{selector}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::types::ParserKind;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "searches": ["https://www.immobilienscout24.de/Suche/de/hamburg/hamburg/wohnung-mieten?equipment=balcony"],
                "limit": 40,
                "required_fields": [],
                "fields": [
                    {{"name": "price", "selector": ".is24qa-kaltmiete"}},
                    {{"name": "kaution", "selector": ".is24qa-kaution-o-genossenschaftsanteile"}},
                    {{"name": "size", "selector": ".is24qa-flaeche-main", "kind": "currency"}}
                ]
            }}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.limit, 40);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.site, SiteConfig::default());
        assert!(settings.completeness_gate() == CompletenessGate::disabled());

        let spec = settings.field_spec().unwrap();
        let fields: Vec<_> = spec.fields().iter().map(|f| (f.name.as_str(), f.kind)).collect();
        assert_eq!(
            fields,
            vec![
                ("price", ParserKind::Currency),
                ("deposit", ParserKind::Currency),
                ("size", ParserKind::Currency),
            ]
        );
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid settings file"));
    }

    #[test]
    fn invalid_search_url_fails_validation() {
        let settings = Settings {
            searches: vec!["wohnung-mieten".to_string()],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_searches_fail_validation() {
        let settings = Settings {
            searches: Vec::new(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.to_string(), "No searches configured");
    }

    #[test]
    fn bad_result_container_fails_at_startup() {
        let mut settings = Settings::default();
        settings.site.result_container = "li..result-list__listing".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("site.result_container"));
    }

    #[test]
    fn bad_captcha_and_field_selectors_are_rejected() {
        let mut settings = Settings::default();
        settings.interstitials.captcha = ".geetest_panel,".to_string();
        assert!(settings.validate().is_err());

        let settings = Settings {
            fields: vec![FieldDef::new("price", "dd[[kaltmiete")],
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn empty_interstitial_selector_is_allowed() {
        let mut settings = Settings::default();
        settings.interstitials.consent = String::new();
        settings.validate().unwrap();
    }

    #[test]
    fn price_only_map_keeps_records_under_default_gate() {
        let settings = Settings {
            fields: vec![FieldDef::new("price", ".is24qa-kaltmiete")],
            ..Settings::default()
        };
        settings.validate().unwrap();
        let spec = settings.field_spec().unwrap();
        let page = crate::scrapers::document::PageDocument::parse("<h1>Wohnung</h1>");
        let record =
            crate::scrapers::extractor::extract(&page, &spec, &settings.completeness_gate()).unwrap();
        assert_eq!(record.get("price"), Some(&crate::models::FieldValue::Null));
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = Settings::default();
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn durations_derive_from_seconds() {
        let settings = Settings {
            page_load_timeout_secs: 45,
            settle_ms: 500,
            ..Settings::default()
        };
        let load = settings.load_settings();
        assert_eq!(load.page_load_timeout, Duration::from_secs(45));
        assert_eq!(load.settle, Duration::from_millis(500));
    }
}
