//! Pipeline orchestration.
//!
//! The five stages run once, top to bottom: publications → citing authors →
//! affiliations → geocoding → CSV + map. One Scholar session is created at
//! the start and reused throughout. Stage 2 and 3 outputs are cached to disk
//! as soon as they are complete; `--from-csv` skips stages 1-4 entirely and
//! rebuilds the map from a previously exported CSV.

use crate::affiliation::{dedup_records, AffiliationRecord, Cleaner, CleaningPolicy};
use crate::cache::{StageCache, AFFILIATION_RECORDS_FILE, CITING_RECORDS_FILE};
use crate::citations::{self, CitingRecord, NO_AUTHOR_FOUND};
use crate::error::{CitemapError, Result};
use crate::export;
use crate::geocode::{self, GeocodeClient, LocatedRecord};
use crate::map;
use crate::profile::{self, AuthorProfile};
use crate::session::{ScholarSession, SessionOptions};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything the pipeline needs, assembled by the CLI.
pub struct PipelineConfig {
    pub scholar_id: String,
    /// Map output file name, placed in the per-scholar directory
    pub map_file: String,
    /// CSV output file name, placed in the per-scholar directory
    pub csv_file: String,
    /// Rebuild the map from the CSV, skipping all scraping
    pub from_csv: bool,
    /// Resume from the stage caches of an interrupted run
    pub resume: bool,
    pub cache_dir: PathBuf,
    pub policy: CleaningPolicy,
    pub colorful_pins: bool,
    /// Print the citing author/affiliation listing before and after cleaning
    pub print_affiliations: bool,
    /// Publication-list pages to fetch (100 publications each)
    pub max_pages: usize,
    /// Citing-result pages to fetch per publication (10 results each)
    pub citing_pages: usize,
    pub session: SessionOptions,
}

/// Summary over the final record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationStats {
    pub authors: usize,
    pub affiliations: usize,
    pub countries: usize,
}

/// Run the full pipeline and return the summary statistics.
pub async fn generate_citation_map(config: &PipelineConfig) -> Result<CitationStats> {
    let cache = StageCache::new(&config.cache_dir, &config.scholar_id);
    std::fs::create_dir_all(cache.dir())?;
    let csv_path = cache.path(&config.csv_file);
    let map_path = cache.path(&config.map_file);

    let records = if config.from_csv {
        println!("\n--- Rebuilding from {} ---", csv_path.display());
        export::read_csv(&csv_path)?
    } else {
        let located = run_scrape(config, &cache).await?;

        println!("\n--- Stage 5: Export ---");
        export::write_csv(&located, &csv_path)?;
        println!("Citation information exported to {}.", csv_path.display());
        located
    };

    map::write_map(&records, &map_path, config.colorful_pins)?;
    println!("HTML map created and saved at {}.", map_path.display());

    let stats = count_citation_stats(&records);
    println!(
        "\nYou have been cited by {} researchers from {} affiliations and {} countries.",
        stats.authors, stats.affiliations, stats.countries
    );
    Ok(stats)
}

/// Stages 1-4.
async fn run_scrape(config: &PipelineConfig, cache: &StageCache) -> Result<Vec<LocatedRecord>> {
    let affiliation_records = collect_affiliation_records(config, cache).await?;

    println!("\n--- Stage 4: Geocoding ---");
    let located = geocode::locate_records(&GeocodeClient::new()?, &affiliation_records).await;
    Ok(geocode::dedup_located(located))
}

/// Stages 1-3, honoring `--resume` stage caches.
async fn collect_affiliation_records(
    config: &PipelineConfig,
    cache: &StageCache,
) -> Result<Vec<AffiliationRecord>> {
    if config.resume {
        if let Some(records) = cache.load::<AffiliationRecord>(AFFILIATION_RECORDS_FILE) {
            println!("\n--- Resuming from cached citing affiliations ---");
            return Ok(records);
        }
    }

    let session = ScholarSession::new(&config.session)?;

    let cached_citing = if config.resume {
        cache.load::<CitingRecord>(CITING_RECORDS_FILE)
    } else {
        None
    };

    let citing_records = match cached_citing {
        Some(records) => {
            println!("\n--- Resuming from cached citing records ---");
            records
        }
        None => {
            println!("\n--- Stage 1: Publications ---");
            let publications =
                profile::fetch_publications(&session, &config.scholar_id, config.max_pages).await?;
            println!(
                "Author profile found, with {} cited publications.",
                publications.len()
            );

            println!("\n--- Stage 2: Citing authors ---");
            let mut citing_records: Vec<CitingRecord> = Vec::new();
            for (idx, publication) in publications.iter().enumerate() {
                println!(
                    "[{}/{}] {}",
                    idx + 1,
                    publications.len(),
                    publication.title
                );
                match citations::fetch_citing_records(&session, publication, config.citing_pages)
                    .await
                {
                    Ok(records) => citing_records.extend(records),
                    // Past a CAPTCHA wall every further fetch fails the same way
                    Err(e @ CitemapError::Captcha) => return Err(e),
                    Err(e) => warn!(title = %publication.title, error = %e, "Skipping publication"),
                }
                session.page_pause().await;
            }
            println!("A total of {} citing records.", citing_records.len());
            cache.save(CITING_RECORDS_FILE, &citing_records)?;
            citing_records
        }
    };

    println!("\n--- Stage 3: Citing affiliations ---");
    let affiliation_records = fetch_affiliations(&session, &citing_records).await?;
    let affiliation_records = dedup_records(affiliation_records);
    println!(
        "A total of {} citing affiliations recorded.",
        affiliation_records.len()
    );

    let cleaner = Cleaner::new()?;
    if config.print_affiliations {
        match config.policy {
            CleaningPolicy::Conservative => {
                println!("Taking the conservative approach; affiliation lines kept as scraped.");
                println!("Citing authors and affiliations:\n");
            }
            CleaningPolicy::Aggressive => {
                println!("Taking the aggressive approach; cleaning the affiliation lines.");
                println!("Citing authors and affiliations before cleaning:\n");
            }
        }
        print_author_affiliations(&affiliation_records);
    }

    let affiliation_records = cleaner.apply_policy(affiliation_records, config.policy);
    if config.print_affiliations && config.policy == CleaningPolicy::Aggressive {
        println!("Citing authors and affiliations after cleaning:\n");
        print_author_affiliations(&affiliation_records);
    }
    cache.save(AFFILIATION_RECORDS_FILE, &affiliation_records)?;

    Ok(affiliation_records)
}

/// Visit each citing author's profile for name + affiliation line.
///
/// Profiles are fetched once per author id; scrape failures skip the record,
/// a CAPTCHA aborts the run.
async fn fetch_affiliations(
    session: &ScholarSession,
    citing_records: &[CitingRecord],
) -> Result<Vec<AffiliationRecord>> {
    let mut profile_memo: HashMap<String, Option<AuthorProfile>> = HashMap::new();
    let mut records = Vec::new();

    info!(
        count = citing_records.len(),
        "Finding citing affiliations"
    );

    for citing in citing_records {
        if citing.is_sentinel() {
            records.push(AffiliationRecord::no_author(
                citing.citing_paper.clone(),
                citing.cited_paper.clone(),
            ));
            continue;
        }

        if !profile_memo.contains_key(&citing.author_id) {
            session.profile_pause().await;
            let fetched = match profile::fetch_author_profile(session, &citing.author_id).await {
                Ok(profile) => Some(profile),
                Err(e @ CitemapError::Captcha) => return Err(e),
                Err(e) => {
                    warn!(author_id = %citing.author_id, error = %e, "Skipping citing author");
                    None
                }
            };
            profile_memo.insert(citing.author_id.clone(), fetched);
        }

        let Some(Some(profile)) = profile_memo.get(&citing.author_id).map(Option::as_ref) else {
            continue;
        };
        if profile.affiliation.is_empty() {
            continue;
        }

        records.push(AffiliationRecord {
            author_name: profile.name.clone(),
            citing_paper: citing.citing_paper.clone(),
            cited_paper: citing.cited_paper.clone(),
            affiliation: profile.affiliation.clone(),
        });
    }

    Ok(records)
}

/// Count unique citing authors, affiliations and countries over the final
/// record set, sentinel records excluded.
pub fn count_citation_stats(records: &[LocatedRecord]) -> CitationStats {
    let mut authors = BTreeSet::new();
    let mut affiliations = BTreeSet::new();
    let mut countries = BTreeSet::new();

    for record in records {
        if record.affiliation == NO_AUTHOR_FOUND {
            continue;
        }
        authors.insert(record.author_name.as_str());
        affiliations.insert(record.affiliation.as_str());
        if !record.country.is_empty() {
            countries.insert(record.country.as_str());
        }
    }

    CitationStats {
        authors: authors.len(),
        affiliations: affiliations.len(),
        countries: countries.len(),
    }
}

/// Print the unique (author, affiliation) pairs, sorted.
fn print_author_affiliations(records: &[AffiliationRecord]) {
    let pairs: BTreeSet<(&str, &str)> = records
        .iter()
        .filter(|r| !r.is_sentinel())
        .map(|r| (r.author_name.as_str(), r.affiliation.as_str()))
        .collect();
    for (author, affiliation) in pairs {
        println!("Author: {}. Affiliation: {}.", author, affiliation);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(author: &str, affiliation: &str, country: &str) -> LocatedRecord {
        LocatedRecord {
            author_name: author.to_string(),
            citing_paper: "Citing".to_string(),
            cited_paper: "Cited".to_string(),
            affiliation: affiliation.to_string(),
            latitude: Some(1.0),
            longitude: Some(2.0),
            county: String::new(),
            city: String::new(),
            state: String::new(),
            country: country.to_string(),
        }
    }

    #[test]
    fn test_count_citation_stats() {
        let records = vec![
            located("Alice", "MIT", "United States"),
            located("Alice", "MIT", "United States"),
            located("Bob", "ETH Zurich", "Switzerland"),
            located(NO_AUTHOR_FOUND, NO_AUTHOR_FOUND, ""),
        ];
        let stats = count_citation_stats(&records);
        assert_eq!(stats.authors, 2);
        assert_eq!(stats.affiliations, 2);
        assert_eq!(stats.countries, 2);
    }

    #[test]
    fn test_stats_skip_blank_country() {
        let records = vec![located("Alice", "Unknown Lab", "")];
        let stats = count_citation_stats(&records);
        assert_eq!(stats.authors, 1);
        assert_eq!(stats.affiliations, 1);
        assert_eq!(stats.countries, 0);
    }
}
