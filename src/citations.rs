//! Citing-author discovery.
//!
//! For each publication, the `scholar?cites=<id>` result pages list the
//! papers citing it. Each result's byline (`div.gs_a`) links the authors who
//! have Scholar profiles; those profile ids are what stage 3 visits for
//! affiliations. A citing paper whose byline carries no profile links still
//! produces one record, marked with the sentinel, so the citation is counted
//! even though its authors cannot be located.

use crate::error::{CitemapError, Result};
use crate::profile::Publication;
use crate::session::ScholarSession;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Sentinel for citing papers whose authors have no Scholar profile.
pub const NO_AUTHOR_FOUND: &str = "no author found";

/// Citing results per page; Scholar's fixed page size.
const RESULTS_PER_PAGE: usize = 10;

/// One (citing author, citing paper, cited paper) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CitingRecord {
    /// Scholar profile id of the citing author, or the sentinel
    pub author_id: String,
    pub citing_paper: String,
    pub cited_paper: String,
}

impl CitingRecord {
    pub fn is_sentinel(&self) -> bool {
        self.author_id == NO_AUTHOR_FOUND
    }
}

/// One parsed citing-results page.
#[derive(Debug, Default)]
pub struct CitingPage {
    /// (profile ids in the byline, citing paper title) per result
    pub results: Vec<(Vec<String>, String)>,
}

/// Fetch all citing records for one publication.
///
/// Pages `scholar?cites=` with `start=` until an empty page, capped at
/// `max_pages`.
pub async fn fetch_citing_records(
    session: &ScholarSession,
    publication: &Publication,
    max_pages: usize,
) -> Result<Vec<CitingRecord>> {
    let mut records = Vec::new();

    for page in 0..max_pages {
        let url = build_cites_url(session.base_url(), &publication.cites_id, page * RESULTS_PER_PAGE)?;
        let html = session.fetch_html(&url).await?;
        let parsed = parse_citing_page(&html)?;

        if parsed.results.is_empty() {
            break;
        }

        debug!(
            cites_id = %publication.cites_id,
            page = page + 1,
            results = parsed.results.len(),
            "Parsed citing page"
        );

        let result_count = parsed.results.len();
        for (author_ids, citing_paper) in parsed.results {
            if author_ids.is_empty() {
                records.push(CitingRecord {
                    author_id: NO_AUTHOR_FOUND.to_string(),
                    citing_paper,
                    cited_paper: publication.title.clone(),
                });
            } else {
                for author_id in author_ids {
                    records.push(CitingRecord {
                        author_id,
                        citing_paper: citing_paper.clone(),
                        cited_paper: publication.title.clone(),
                    });
                }
            }
        }

        if result_count < RESULTS_PER_PAGE {
            break;
        }
        session.page_pause().await;
    }

    info!(
        cited_paper = %publication.title,
        count = records.len(),
        "Citing authors collected"
    );
    Ok(records)
}

/// Build a citing-results URL.
fn build_cites_url(base_url: &str, cites_id: &str, start: usize) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))
        .map_err(|e| CitemapError::Config(format!("Invalid base URL: {}", e)))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("hl", "en");
        params.append_pair("cites", cites_id);
        if start > 0 {
            params.append_pair("start", &start.to_string());
        }
    }
    Ok(url)
}

/// Parse one citing-results page into (byline profile ids, title) pairs.
pub fn parse_citing_page(html: &str) -> Result<CitingPage> {
    let document = Html::parse_document(html);

    let item_selector =
        Selector::parse("div.gs_r.gs_or.gs_scl").map_err(|e| CitemapError::Parse(e.to_string()))?;
    let title_selector =
        Selector::parse("h3.gs_rt").map_err(|e| CitemapError::Parse(e.to_string()))?;
    let byline_link_selector =
        Selector::parse("div.gs_a a").map_err(|e| CitemapError::Parse(e.to_string()))?;

    let user_regex =
        Regex::new(r"user=([^&]+)").map_err(|e| CitemapError::Parse(e.to_string()))?;

    let mut page = CitingPage::default();

    for item in document.select(&item_selector) {
        let Some(title_el) = item.select(&title_selector).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let mut author_ids = Vec::new();
        for link in item.select(&byline_link_selector) {
            let href = link.value().attr("href").unwrap_or("");
            if let Some(caps) = user_regex.captures(href) {
                if let Some(id) = caps.get(1) {
                    let id = id.as_str().to_string();
                    if !author_ids.contains(&id) {
                        author_ids.push(id);
                    }
                }
            }
        }

        page.results.push((author_ids, title));
    }

    Ok(page)
}
