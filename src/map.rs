//! Citation world map rendering.
//!
//! Records are grouped by affiliation into one pin each; the popup lists all
//! co-located citing authors. An affiliation is skipped when it is the
//! sentinel or when any of its records lacks coordinates (a half-located
//! group means the label geocoded inconsistently across runs). Output is a
//! self-contained Leaflet HTML file with the marker data embedded as JSON.

use crate::citations::NO_AUTHOR_FOUND;
use crate::error::Result;
use crate::geocode::LocatedRecord;
use askama::Template;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Pin palette, cycled per affiliation in first-seen order.
const PIN_COLORS: &[&str] = &[
    "#d63e2a", "#38aadd", "#72b026", "#d252b9", "#f69730", "#a23336",
    "#ff8e7f", "#ffcb92", "#0067a3", "#728224", "#436978", "#5b396b",
    "#ff91ea", "#8adaff", "#bbf970", "#575757", "#303030", "#a3a3a3",
];

/// Single color used with `--plain-pins`.
const DEFAULT_PIN_COLOR: &str = "#38aadd";

/// One map pin.
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub affiliation: String,
    pub authors: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub color: String,
}

#[derive(Template)]
#[template(path = "map.html")]
struct MapTemplate {
    markers_json: String,
    generated_at: String,
    affiliation_count: usize,
    author_count: usize,
}

/// Group located records into map pins.
pub fn build_markers(records: &[LocatedRecord], colorful: bool) -> Vec<Marker> {
    // Unique affiliations in first-seen order, with their record indices
    let mut label_order: Vec<String> = Vec::new();
    let mut label_entries: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if record.affiliation == NO_AUTHOR_FOUND {
            continue;
        }
        let entries = label_entries
            .entry(record.affiliation.clone())
            .or_insert_with(|| {
                label_order.push(record.affiliation.clone());
                Vec::new()
            });
        entries.push(idx);
    }

    let mut markers = Vec::new();
    for (group_idx, label) in label_order.iter().enumerate() {
        let entries = &label_entries[label];

        if entries.iter().any(|&idx| !records[idx].has_coordinates()) {
            debug!(affiliation = %label, "Skipping pin with missing coordinates");
            continue;
        }

        let mut authors = Vec::new();
        for &idx in entries {
            let name = &records[idx].author_name;
            if !authors.contains(name) {
                authors.push(name.clone());
            }
        }

        let first = &records[entries[0]];
        let color = if colorful {
            PIN_COLORS[group_idx % PIN_COLORS.len()].to_string()
        } else {
            DEFAULT_PIN_COLOR.to_string()
        };

        markers.push(Marker {
            affiliation: label.clone(),
            authors,
            latitude: first.latitude.unwrap_or_default(),
            longitude: first.longitude.unwrap_or_default(),
            color,
        });
    }
    markers
}

/// Render the map HTML.
pub fn render_map(records: &[LocatedRecord], colorful: bool) -> Result<String> {
    let markers = build_markers(records, colorful);

    let mut authors: Vec<&str> = markers
        .iter()
        .flat_map(|m| m.authors.iter().map(String::as_str))
        .collect();
    authors.sort_unstable();
    authors.dedup();

    let template = MapTemplate {
        markers_json: serde_json::to_string(&markers)?,
        generated_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        affiliation_count: markers.len(),
        author_count: authors.len(),
    };
    Ok(template.render()?)
}

/// Render and write the map HTML file.
pub fn write_map(records: &[LocatedRecord], path: &Path, colorful: bool) -> Result<()> {
    let html = render_map(records, colorful)?;
    std::fs::write(path, html)?;
    info!(path = %path.display(), "HTML map created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(author: &str, affiliation: &str, lat: Option<f64>) -> LocatedRecord {
        LocatedRecord {
            author_name: author.to_string(),
            citing_paper: "Citing".to_string(),
            cited_paper: "Cited".to_string(),
            affiliation: affiliation.to_string(),
            latitude: lat,
            longitude: lat.map(|v| v / 2.0),
            county: String::new(),
            city: String::new(),
            state: String::new(),
            country: String::new(),
        }
    }

    #[test]
    fn test_authors_grouped_under_one_pin() {
        let records = vec![
            located("Alice", "MIT", Some(42.36)),
            located("Bob", "MIT", Some(42.36)),
            located("Carol", "ETH Zurich", Some(47.38)),
        ];
        let markers = build_markers(&records, true);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].affiliation, "MIT");
        assert_eq!(markers[0].authors, vec!["Alice", "Bob"]);
        assert_eq!(markers[1].authors, vec!["Carol"]);
    }

    #[test]
    fn test_duplicate_author_listed_once() {
        let records = vec![
            located("Alice", "MIT", Some(42.36)),
            located("Alice", "MIT", Some(42.36)),
        ];
        let markers = build_markers(&records, true);
        assert_eq!(markers[0].authors, vec!["Alice"]);
    }

    #[test]
    fn test_missing_coordinates_skip_pin() {
        let records = vec![
            located("Alice", "MIT", Some(42.36)),
            located("Bob", "MIT", None),
            located("Carol", "ETH Zurich", Some(47.38)),
        ];
        let markers = build_markers(&records, true);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].affiliation, "ETH Zurich");
    }

    #[test]
    fn test_sentinel_excluded() {
        let records = vec![located(NO_AUTHOR_FOUND, NO_AUTHOR_FOUND, Some(1.0))];
        assert!(build_markers(&records, true).is_empty());
    }

    #[test]
    fn test_plain_pins_single_color() {
        let records = vec![
            located("Alice", "MIT", Some(42.36)),
            located("Carol", "ETH Zurich", Some(47.38)),
        ];
        let markers = build_markers(&records, false);
        assert!(markers.iter().all(|m| m.color == DEFAULT_PIN_COLOR));

        let colorful = build_markers(&records, true);
        assert_ne!(colorful[0].color, colorful[1].color);
    }

    #[test]
    fn test_render_map_embeds_markers() -> Result<()> {
        let records = vec![located("Alice", "MIT", Some(42.36))];
        let html = render_map(&records, true)?;
        assert!(html.contains("leaflet"));
        assert!(html.contains("\"affiliation\":\"MIT\""));
        assert!(html.contains("\"authors\":[\"Alice\"]"));
        Ok(())
    }

    #[test]
    fn test_write_map() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("citation_map.html");
        write_map(&[located("Alice", "MIT", Some(42.36))], &path, true)?;
        assert!(path.exists());
        Ok(())
    }
}
