//! Page extractors for tracker HTML.
//!
//! Each extractor knows one page shape and turns its HTML into typed data.
//! They never fetch anything, so the HTTP layer and the markup can change
//! independently.

use scraper::{Html, Selector};

use crate::errors::SourceError;

/// Extracts typed data from one kind of page.
pub trait PageExtractor {
    /// Data produced from a page
    type Output;

    /// Parses `html` into the extractor's output.
    ///
    /// # Errors
    ///
    /// - `SourceError::Extraction` - Page does not have the expected shape
    fn extract(&self, html: &str) -> Result<Self::Output, SourceError>;
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Extraction {
        reason: format!("invalid selector {css}: {e}"),
    })
}

/// Finds the torrent download link on a details page.
#[derive(Debug, Clone, Default)]
pub struct DetailsPageExtractor;

impl PageExtractor for DetailsPageExtractor {
    type Output = String;

    fn extract(&self, html: &str) -> Result<String, SourceError> {
        let document = Html::parse_document(html);
        let link = selector("a.download-link[href]")?;

        document
            .select(&link)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SourceError::Extraction {
                reason: "details page has no download link".to_string(),
            })
    }
}

/// Seeding obligation row from the obligation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    /// Source id of the torrent the row refers to
    pub source_id: String,
    /// Status text as shown on the page
    pub status: String,
}

impl Obligation {
    /// Checks if the row says seeding is no longer required.
    pub fn is_removable(&self) -> bool {
        let status = self.status.trim().to_ascii_lowercase();
        status == "complete" || status == "satisfied"
    }
}

/// Reads every obligation row from the obligation page.
#[derive(Debug, Clone, Default)]
pub struct ObligationPageExtractor;

impl PageExtractor for ObligationPageExtractor {
    type Output = Vec<Obligation>;

    fn extract(&self, html: &str) -> Result<Vec<Obligation>, SourceError> {
        let document = Html::parse_document(html);
        let row_selector = selector("tr[data-source-id]")?;
        let status_selector = selector(".status")?;

        let mut obligations = Vec::new();
        for row in document.select(&row_selector) {
            let Some(source_id) = row
                .value()
                .attr("data-source-id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
            else {
                continue;
            };

            let status = row
                .select(&status_selector)
                .next()
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            obligations.push(Obligation {
                source_id: source_id.to_string(),
                status,
            });
        }

        Ok(obligations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_page_download_link() {
        let html = r#"
            <html><body>
              <a class="nav" href="/home">Home</a>
              <a class="btn download-link" href="/download/42.torrent">Download</a>
            </body></html>"#;

        let link = DetailsPageExtractor.extract(html).unwrap();
        assert_eq!(link, "/download/42.torrent");
    }

    #[test]
    fn test_details_page_without_link() {
        let result = DetailsPageExtractor.extract("<html><a class='download-link'>x</a></html>");
        assert!(matches!(result, Err(SourceError::Extraction { .. })));
    }

    #[test]
    fn test_obligation_rows() {
        let html = r#"
            <table>
              <tr><th>Torrent</th><th>Status</th></tr>
              <tr data-source-id="10"><td>A</td><td class="status"> Complete </td></tr>
              <tr data-source-id="11"><td>B</td><td class="status">Seeding</td></tr>
              <tr data-source-id="12"><td>C</td><td class="status">satisfied</td></tr>
              <tr data-source-id=""><td>D</td><td class="status">complete</td></tr>
            </table>"#;

        let obligations = ObligationPageExtractor.extract(html).unwrap();
        assert_eq!(obligations.len(), 3);

        let removable: Vec<_> = obligations
            .iter()
            .filter(|o| o.is_removable())
            .map(|o| o.source_id.as_str())
            .collect();
        assert_eq!(removable, vec!["10", "12"]);
    }

    #[test]
    fn test_empty_obligation_page() {
        let obligations = ObligationPageExtractor.extract("<html></html>").unwrap();
        assert!(obligations.is_empty());
    }
}
