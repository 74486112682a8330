use crate::error::ScoutResult;
use crate::models::{ContextFlags, ListingLink};
use crate::scrapers::document::{query_within, read_attribute, read_text, PageDocument};
use crate::scrapers::types::SiteConfig;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Collect up to `max` listing links from a search result page, in page order.
/// Every link carries `flags`; results are unique by (URL, flags).
pub fn collect(
    page: &PageDocument,
    flags: &ContextFlags,
    site: &SiteConfig,
    max: usize,
) -> ScoutResult<Vec<ListingLink>> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    if max == 0 {
        return Ok(links);
    }

    let containers = page.query_all(&site.result_container)?;
    debug!("Found {} result containers", containers.len());

    for (idx, container) in containers.into_iter().enumerate() {
        let Some(anchor) = query_within(container, &site.result_link)? else {
            debug!("Skipped result {}: no link", idx);
            continue;
        };
        let Some(address) = query_within(container, &site.result_address)? else {
            debug!("Skipped result {}: no address", idx);
            continue;
        };

        let address = read_text(address);
        if !is_plausible_address(&address) {
            debug!("Skipped result {}: incomplete address '{}'", idx, address);
            continue;
        }

        let Some(href) = read_attribute(anchor, "href") else {
            continue;
        };
        let Some(url) = normalize_href(href.trim(), site) else {
            debug!("Skipped result {}: foreign link {}", idx, href);
            continue;
        };

        let link = ListingLink::new(url, flags.clone());
        if seen.insert(link.clone()) {
            links.push(link);
            if links.len() >= max {
                break;
            }
        }
    }

    Ok(links)
}

/// An address counts when the part before its first comma has a digit
/// ("Musterstraße 12, 10115 Berlin"); bare district names do not.
pub fn is_plausible_address(address: &str) -> bool {
    match address.split_once(',') {
        Some((street, _)) => street.chars().any(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Absolute expose URL for `href`, or `None` if it does not point at an expose
pub fn normalize_href(href: &str, site: &SiteConfig) -> Option<String> {
    if href.starts_with(&site.listing_path) {
        let base = Url::parse(&site.base_url).ok()?;
        return base.join(href).ok().map(String::from);
    }

    let absolute = Url::parse(href).ok()?;
    let base = Url::parse(&site.base_url).ok()?;
    let same_site = absolute.host_str().is_some() && absolute.host_str() == base.host_str();
    if same_site && absolute.path().starts_with(&site.listing_path) {
        Some(href.to_string())
    } else {
        None
    }
}
