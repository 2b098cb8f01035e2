//! Affiliation string cleaning.
//!
//! Scholar profiles carry a single free-text affiliation line of wildly
//! inconsistent format ("Professor of CS at MIT; also DeepMind, London, UK").
//! This module turns that line into zero or more canonical institution labels
//! that have a chance of geocoding:
//!
//! 1. split on `;` and the standalone word `and`
//! 2. comma-split, re-merging a fragment with a trailing country name
//! 3. strip everything up to a standalone `at` or an `@`
//! 4. drop fragments that describe a person rather than an institution
//!
//! The heuristics are naive by design; they trade precision for zero external
//! dependencies at cleaning time.

use crate::citations::NO_AUTHOR_FOUND;
use crate::countries;
use crate::error::{CitemapError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One (author, citing paper, cited paper, affiliation) record.
///
/// Equality and hashing are over the whole tuple; every dedup step in the
/// pipeline is set-semantics over these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffiliationRecord {
    pub author_name: String,
    pub citing_paper: String,
    pub cited_paper: String,
    pub affiliation: String,
}

impl AffiliationRecord {
    /// Sentinel record for a citing paper whose byline had no profile links.
    pub fn no_author(citing_paper: String, cited_paper: String) -> Self {
        Self {
            author_name: NO_AUTHOR_FOUND.to_string(),
            citing_paper,
            cited_paper,
            affiliation: NO_AUTHOR_FOUND.to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.author_name == NO_AUTHOR_FOUND
    }
}

/// How much of the raw affiliation text to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningPolicy {
    /// Keep the raw profile line untouched.
    Conservative,
    /// Clean the line and keep the union of raw and cleaned records,
    /// maximizing geocoding coverage.
    Aggressive,
}

/// Affiliation cleaner with pre-compiled patterns.
pub struct Cleaner {
    /// Splits on `;` or the standalone word `and`
    delimiter_re: Regex,
    /// Splits on ASCII and fullwidth commas
    comma_re: Regex,
    /// Matches everything up to a standalone `at` or an `@`
    role_prefix_re: Regex,
    /// Matches words that describe a person's identity, not an institution
    identity_re: Regex,
}

impl Cleaner {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CitemapError::Parse(format!("bad pattern: {e}")))
        };
        Ok(Self {
            delimiter_re: compile(r"[;]|\band\b")?,
            comma_re: compile(r"[,，]")?,
            role_prefix_re: compile(r"(?i).*?\bat\b|.*?@")?,
            identity_re: compile(
                r"(?i)\b(director|manager|chair|engineer|programmer|scientist|professor|lecturer|phd|ph\.d|postdoc|doctor|student|department of)\b",
            )?,
        })
    }

    /// Clean one raw affiliation line into canonical institution labels.
    ///
    /// Returns an empty vec when every fragment is filtered out.
    pub fn clean(&self, raw: &str) -> Vec<String> {
        let parts: Vec<String> = self
            .delimiter_re
            .split(raw)
            .map(|p| p.trim().to_string())
            .collect();

        let mut labels = Vec::new();
        for fragment in self.country_aware_comma_split(&parts) {
            let label = self
                .role_prefix_re
                .replace_all(&fragment, "")
                .trim()
                .to_string();
            if label.is_empty() {
                continue;
            }
            if self.identity_re.is_match(&label) {
                debug!(fragment = %label, "dropped identity fragment");
                continue;
            }
            labels.push(label);
        }
        labels
    }

    /// Split fragments on commas, walking the pieces pairwise: a piece whose
    /// successor is a country name is re-joined with it ("Oxford, UK" stays
    /// one label); otherwise both pieces are emitted separately. A country
    /// name landing in the leading slot of a pair is dropped on its own.
    ///
    /// "University of Oxford, UK" -> ["University of Oxford, UK"]
    /// "Tsinghua University, Beijing, China" -> ["Tsinghua University", "Beijing"]
    fn country_aware_comma_split(&self, parts: &[String]) -> Vec<String> {
        let mut out = Vec::new();

        for part in parts {
            let subs: Vec<String> = self
                .comma_re
                .split(part)
                .map(|s| s.trim().to_string())
                .collect();

            let mut i = 0;
            while i < subs.len() {
                if countries::is_country(&subs[i]) {
                    i += 1;
                    continue;
                }
                match subs.get(i + 1) {
                    Some(next) if countries::is_country(next) => {
                        out.push(format!("{}, {}", subs[i], next));
                        i += 2;
                    }
                    Some(next) => {
                        if !subs[i].is_empty() {
                            out.push(subs[i].clone());
                        }
                        if !next.is_empty() {
                            out.push(next.clone());
                        }
                        i += 2;
                    }
                    None => {
                        if !subs[i].is_empty() {
                            out.push(subs[i].clone());
                        }
                        i += 1;
                    }
                }
            }
        }
        out
    }

    /// Expand raw records into cleaned ones.
    ///
    /// Sentinel records pass through unchanged; every other record yields one
    /// output record per surviving label.
    pub fn clean_records(&self, records: &[AffiliationRecord]) -> Vec<AffiliationRecord> {
        let mut cleaned = Vec::new();
        for record in records {
            if record.is_sentinel() {
                cleaned.push(record.clone());
                continue;
            }
            for label in self.clean(&record.affiliation) {
                cleaned.push(AffiliationRecord {
                    author_name: record.author_name.clone(),
                    citing_paper: record.citing_paper.clone(),
                    cited_paper: record.cited_paper.clone(),
                    affiliation: label,
                });
            }
        }
        cleaned
    }

    /// Apply the cleaning policy to a deduplicated record set.
    ///
    /// Conservative keeps the input as-is; aggressive unions input and
    /// cleaned output, deduplicated and sorted for stable downstream order.
    pub fn apply_policy(
        &self,
        records: Vec<AffiliationRecord>,
        policy: CleaningPolicy,
    ) -> Vec<AffiliationRecord> {
        match policy {
            CleaningPolicy::Conservative => records,
            CleaningPolicy::Aggressive => {
                let cleaned = self.clean_records(&records);
                let mut merged = records;
                merged.extend(cleaned);
                dedup_records(merged)
            }
        }
    }
}

/// Set-dedup a record list, preserving a stable sorted order.
pub fn dedup_records(mut records: Vec<AffiliationRecord>) -> Vec<AffiliationRecord> {
    records.sort();
    records.dedup();
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> Cleaner {
        Cleaner::new().expect("patterns compile")
    }

    fn record(author: &str, affiliation: &str) -> AffiliationRecord {
        AffiliationRecord {
            author_name: author.to_string(),
            citing_paper: "Citing Paper".to_string(),
            cited_paper: "Cited Paper".to_string(),
            affiliation: affiliation.to_string(),
        }
    }

    // =========================================================================
    // Delimiter splitting
    // =========================================================================

    #[test]
    fn test_semicolon_split() {
        let c = cleaner();
        assert_eq!(c.clean("MIT; Harvard University"), vec!["MIT", "Harvard University"]);
    }

    #[test]
    fn test_and_split() {
        let c = cleaner();
        assert_eq!(c.clean("MIT and Harvard University"), vec!["MIT", "Harvard University"]);
    }

    #[test]
    fn test_and_inside_word_not_split() {
        let c = cleaner();
        // "and" must be a standalone word
        assert_eq!(c.clean("Rand Institute"), vec!["Rand Institute"]);
        assert_eq!(c.clean("Anderson Center"), vec!["Anderson Center"]);
    }

    // =========================================================================
    // Country-aware comma split
    // =========================================================================

    #[test]
    fn test_country_in_odd_slot_consumed() {
        let c = cleaner();
        // Pairwise walk: (University, Beijing) emit separately, then the
        // dangling country is dropped on its own.
        assert_eq!(
            c.clean("Tsinghua University, Beijing, China"),
            vec!["Tsinghua University", "Beijing"]
        );
    }

    #[test]
    fn test_country_in_next_slot_merged() {
        let c = cleaner();
        assert_eq!(
            c.clean("DeepMind, UK, London"),
            vec!["DeepMind, UK", "London"]
        );
    }

    #[test]
    fn test_trailing_country_kept_with_institution() {
        let c = cleaner();
        assert_eq!(
            c.clean("University of Oxford, UK"),
            vec!["University of Oxford, UK"]
        );
    }

    #[test]
    fn test_leading_country_dropped() {
        let c = cleaner();
        assert_eq!(c.clean("China, Tsinghua University"), vec!["Tsinghua University"]);
    }

    #[test]
    fn test_fullwidth_comma() {
        let c = cleaner();
        assert_eq!(
            c.clean("Peking University，China"),
            vec!["Peking University, China"]
        );
    }

    #[test]
    fn test_plain_comma_split_without_country() {
        let c = cleaner();
        assert_eq!(
            c.clean("Microsoft Research, Redmond"),
            vec!["Microsoft Research", "Redmond"]
        );
    }

    // =========================================================================
    // Role prefix stripping
    // =========================================================================

    #[test]
    fn test_at_prefix_stripped() {
        let c = cleaner();
        assert_eq!(c.clean("Research intern at NVIDIA"), vec!["NVIDIA"]);
    }

    #[test]
    fn test_email_prefix_stripped() {
        let c = cleaner();
        assert_eq!(c.clean("someone@stanford.edu"), vec!["stanford.edu"]);
    }

    #[test]
    fn test_at_inside_word_not_stripped() {
        let c = cleaner();
        // "at" must be standalone, "National" contains it
        assert_eq!(c.clean("National Institutes of Health"), vec!["National Institutes of Health"]);
    }

    // =========================================================================
    // Identity filter
    // =========================================================================

    #[test]
    fn test_identity_fragments_dropped() {
        let c = cleaner();
        assert!(c.clean("Professor").is_empty());
        assert!(c.clean("PhD Student").is_empty());
        assert!(c.clean("Senior Software Engineer").is_empty());
        assert!(c.clean("Department of Physics").is_empty());
    }

    #[test]
    fn test_identity_dropped_institution_kept() {
        let c = cleaner();
        // "Professor at MIT" strips to "MIT"; "Chair of X" is dropped outright
        let labels = c.clean("Professor at MIT; Chair of the committee");
        assert_eq!(labels, vec!["MIT"]);
    }

    #[test]
    fn test_postdoc_case_insensitive() {
        let c = cleaner();
        assert!(c.clean("POSTDOC").is_empty());
        assert!(c.clean("PostDoc").is_empty());
    }

    // =========================================================================
    // Whole-line behavior
    // =========================================================================

    #[test]
    fn test_compound_line() {
        let c = cleaner();
        let labels = c.clean("PhD student at Tsinghua University, Beijing, China; intern at Google");
        assert_eq!(labels, vec!["Tsinghua University", "Beijing", "Google"]);
    }

    #[test]
    fn test_empty_input() {
        let c = cleaner();
        assert!(c.clean("").is_empty());
        assert!(c.clean("   ").is_empty());
        assert!(c.clean(";;").is_empty());
    }

    // =========================================================================
    // Record-level cleaning and policies
    // =========================================================================

    #[test]
    fn test_sentinel_passes_through() {
        let c = cleaner();
        let sentinel = AffiliationRecord::no_author("A".to_string(), "B".to_string());
        let out = c.clean_records(&[sentinel.clone()]);
        assert_eq!(out, vec![sentinel]);
    }

    #[test]
    fn test_clean_records_expands() {
        let c = cleaner();
        let out = c.clean_records(&[record("Alice", "MIT and Stanford University")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].affiliation, "MIT");
        assert_eq!(out[1].affiliation, "Stanford University");
        assert!(out.iter().all(|r| r.author_name == "Alice"));
    }

    #[test]
    fn test_conservative_keeps_raw() {
        let c = cleaner();
        let input = vec![record("Alice", "Professor at MIT")];
        let out = c.apply_policy(input.clone(), CleaningPolicy::Conservative);
        assert_eq!(out, input);
    }

    #[test]
    fn test_aggressive_unions_raw_and_cleaned() {
        let c = cleaner();
        let input = vec![record("Alice", "Professor at MIT")];
        let out = c.apply_policy(input, CleaningPolicy::Aggressive);
        let labels: Vec<&str> = out.iter().map(|r| r.affiliation.as_str()).collect();
        assert!(labels.contains(&"Professor at MIT"));
        assert!(labels.contains(&"MIT"));
    }

    #[test]
    fn test_aggressive_dedups() {
        let c = cleaner();
        // Raw line that survives cleaning unchanged must not double up
        let input = vec![record("Alice", "MIT")];
        let out = c.apply_policy(input, CleaningPolicy::Aggressive);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_dedup_records() {
        let records = vec![
            record("Alice", "MIT"),
            record("Bob", "MIT"),
            record("Alice", "MIT"),
        ];
        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 2);
    }
}
