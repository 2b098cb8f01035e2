//! Scholar profile scraping.
//!
//! Two page shapes live here: the publication list of the target scholar
//! (stage 1) and the profile header of a citing author (stage 3). Parsing
//! leans on Scholar's stable ids/classes: `tr.gsc_a_tr` rows with
//! `a.gsc_a_at` titles and `a.gsc_a_ac` "cited by" links, `#gsc_prf_in` for
//! the display name, `.gsc_prf_il` for the affiliation line.
//!
//! The publication list is expanded by paging `cstart`/`pagesize` until a
//! short page comes back, which is the HTTP form of clicking the profile's
//! "show more" button until it disables itself.

use crate::citations::NO_AUTHOR_FOUND;
use crate::error::{CitemapError, Result};
use crate::session::ScholarSession;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

/// Publications fetched per page; Scholar's maximum.
const PAGE_SIZE: usize = 100;

/// A publication with at least one citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Scholar cluster id from the "cited by" link, key for `scholar?cites=`
    pub cites_id: String,
    /// Paper title
    pub title: String,
}

/// One parsed publication-list page.
#[derive(Debug, Default)]
pub struct PublicationPage {
    pub publications: Vec<Publication>,
    /// Raw row count, cited or not; drives pagination
    pub row_count: usize,
}

/// Name and affiliation line off an author profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorProfile {
    pub name: String,
    /// First `.gsc_prf_il` line; empty when the profile shows none
    pub affiliation: String,
}

/// Fetch the scholar's full publication list, deduplicated by cites id.
pub async fn fetch_publications(
    session: &ScholarSession,
    scholar_id: &str,
    max_pages: usize,
) -> Result<Vec<Publication>> {
    let mut publications = Vec::new();
    let mut seen_cites_ids: HashSet<String> = HashSet::new();

    for page in 0..max_pages {
        let cstart = page * PAGE_SIZE;
        let url = build_list_url(session.base_url(), scholar_id, cstart)?;
        let html = session.fetch_html(&url).await?;
        let parsed = parse_publication_page(&html)?;

        debug!(
            page = page + 1,
            rows = parsed.row_count,
            cited = parsed.publications.len(),
            "Parsed publication page"
        );

        for publication in parsed.publications {
            if seen_cites_ids.insert(publication.cites_id.clone()) {
                publications.push(publication);
            }
        }

        // A short page means the list is exhausted
        if parsed.row_count < PAGE_SIZE {
            break;
        }
        session.page_pause().await;
    }

    info!(
        scholar_id = scholar_id,
        count = publications.len(),
        "Publications with citations"
    );
    Ok(publications)
}

/// Fetch a citing author's profile header.
pub async fn fetch_author_profile(
    session: &ScholarSession,
    author_id: &str,
) -> Result<AuthorProfile> {
    let url = build_profile_url(session.base_url(), author_id)?;
    let html = session.fetch_html(&url).await?;
    parse_author_profile(&html)
}

/// Build the paged publication-list URL.
fn build_list_url(base_url: &str, scholar_id: &str, cstart: usize) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/citations", base_url))
        .map_err(|e| CitemapError::Config(format!("Invalid base URL: {}", e)))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("hl", "en");
        params.append_pair("user", scholar_id);
        params.append_pair("view_op", "list_works");
        params.append_pair("sortby", "pubdate");
        params.append_pair("cstart", &cstart.to_string());
        params.append_pair("pagesize", &PAGE_SIZE.to_string());
    }
    Ok(url)
}

/// Build an author profile URL.
fn build_profile_url(base_url: &str, author_id: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/citations", base_url))
        .map_err(|e| CitemapError::Config(format!("Invalid base URL: {}", e)))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("hl", "en");
        params.append_pair("user", author_id);
    }
    Ok(url)
}

/// Parse one publication-list page.
///
/// Rows without a `cites=` link (cited by 0) are counted but not returned.
pub fn parse_publication_page(html: &str) -> Result<PublicationPage> {
    let document = Html::parse_document(html);

    let row_selector =
        Selector::parse("tr.gsc_a_tr").map_err(|e| CitemapError::Parse(e.to_string()))?;
    let title_selector =
        Selector::parse("a.gsc_a_at").map_err(|e| CitemapError::Parse(e.to_string()))?;
    let cites_selector =
        Selector::parse("a.gsc_a_ac").map_err(|e| CitemapError::Parse(e.to_string()))?;

    let cites_regex =
        Regex::new(r"cites=([^&]+)").map_err(|e| CitemapError::Parse(e.to_string()))?;

    let mut page = PublicationPage::default();

    for row in document.select(&row_selector) {
        page.row_count += 1;

        let Some(title_el) = row.select(&title_selector).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();

        let Some(cites_el) = row.select(&cites_selector).next() else {
            continue;
        };
        let href = cites_el.value().attr("href").unwrap_or("");
        let Some(caps) = cites_regex.captures(href) else {
            // No cites= means cited by 0
            continue;
        };
        let Some(cites_id) = caps.get(1) else {
            continue;
        };

        page.publications.push(Publication {
            cites_id: cites_id.as_str().to_string(),
            title,
        });
    }

    Ok(page)
}

/// Parse an author profile page into name + first affiliation line.
///
/// A missing name block yields the sentinel name, matching how a deleted or
/// hidden profile is carried through the rest of the pipeline.
pub fn parse_author_profile(html: &str) -> Result<AuthorProfile> {
    let document = Html::parse_document(html);

    let name_selector =
        Selector::parse("#gsc_prf_in").map_err(|e| CitemapError::Parse(e.to_string()))?;
    let affiliation_selector =
        Selector::parse(".gsc_prf_il").map_err(|e| CitemapError::Parse(e.to_string()))?;

    let name = document
        .select(&name_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| NO_AUTHOR_FOUND.to_string());

    let affiliation = document
        .select(&affiliation_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    Ok(AuthorProfile { name, affiliation })
}
