use crate::error::{ScoutError, ScoutResult};
use scraper::{ElementRef, Html, Selector};

/// Parsed snapshot of the page currently loaded in the browser.
///
/// Element queries run against this snapshot rather than live DOM handles, so
/// everything downstream of a navigation is a pure function of the HTML.
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// First element matching `selector`
    pub fn query(&self, selector: &str) -> ScoutResult<Option<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).next())
    }

    pub fn query_all(&self, selector: &str) -> ScoutResult<Vec<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).collect())
    }
}

/// First descendant of `element` matching `selector`
pub fn query_within<'a>(element: ElementRef<'a>, selector: &str) -> ScoutResult<Option<ElementRef<'a>>> {
    let selector = parse_selector(selector)?;
    Ok(element.select(&selector).next())
}

/// Text content of the element, non-breaking spaces normalized, trimmed
pub fn read_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .replace('\u{00A0}', " ")
        .trim()
        .to_string()
}

/// Visually separate text pieces of the element, each trimmed, empties skipped
pub fn read_segments(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(|piece| piece.replace('\u{00A0}', " ").trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

pub fn read_attribute<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name)
}

fn parse_selector(selector: &str) -> ScoutResult<Selector> {
    Selector::parse(selector).map_err(|e| ScoutError::InvalidSelector(format!("{selector}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSE: &str = r#"
        <html><body>
          <h1 id="expose-title">  Helle 2-Zimmer-Wohnung  </h1>
          <div class="address-block">
            <span>Musterstraße 12,</span>
            <span>10115 Berlin,</span>
            <span>Mitte</span>
          </div>
          <dd class="is24qa-kaltmiete">1.234,56&nbsp;€</dd>
          <a class="link" href="/expose/150993085">Details</a>
        </body></html>
    "#;

    #[test]
    fn query_and_read_text() {
        let page = PageDocument::parse(EXPOSE);
        let title = page.query("#expose-title").unwrap().unwrap();
        assert_eq!(read_text(title), "Helle 2-Zimmer-Wohnung");

        let price = page.query(".is24qa-kaltmiete").unwrap().unwrap();
        assert_eq!(read_text(price), "1.234,56 €");
    }

    #[test]
    fn missing_element_is_none() {
        let page = PageDocument::parse(EXPOSE);
        assert!(page.query(".is24qa-etage").unwrap().is_none());
        assert!(page.query_all("li.result-list__listing").unwrap().is_empty());
    }

    #[test]
    fn segments_follow_child_nodes() {
        let page = PageDocument::parse(EXPOSE);
        let address = page.query(".address-block").unwrap().unwrap();
        assert_eq!(
            read_segments(address),
            vec!["Musterstraße 12,", "10115 Berlin,", "Mitte"]
        );
    }

    #[test]
    fn attribute_lookup_within_element() {
        let page = PageDocument::parse(EXPOSE);
        let body = page.query("body").unwrap().unwrap();
        let link = query_within(body, "a.link").unwrap().unwrap();
        assert_eq!(read_attribute(link, "href"), Some("/expose/150993085"));
        assert_eq!(read_attribute(link, "data-id"), None);
    }

    #[test]
    fn invalid_selector_is_reported() {
        let page = PageDocument::parse(EXPOSE);
        let err = page.query("div[[").unwrap_err();
        assert!(matches!(err, ScoutError::InvalidSelector(_)));
    }
}
