//! Affiliation geocoding via Nominatim.
//!
//! Per the Nominatim usage policy, requests are strictly sequential with at
//! least one second between them; results are memoized per label for the
//! process lifetime so repeated affiliations cost one lookup.
//!
//! Two guards run before any network call. The invalid-label filter drops
//! fragments that would only waste geocoder time ("computer science"). The
//! known-affiliation table pins well-known institutions whose names geocode
//! hilariously wrong otherwise (the company Amazon lands in the Amazon
//! rainforest).

use crate::affiliation::AffiliationRecord;
use crate::citations::NO_AUTHOR_FOUND;
use crate::error::{CitemapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Nominatim base URL
const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Identifying user agent, required by the Nominatim usage policy
const GEOCODER_USER_AGENT: &str = "citemap/0.1 (citation world map generator)";

/// Minimum spacing between Nominatim requests (policy: max 1 req/s)
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Attempts per label before giving up
const MAX_ATTEMPTS: u32 = 3;

/// A resolved location with reverse-geocoded address parts.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub county: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

/// A pipeline record with its resolved (or blank) location.
///
/// Serde renames give the CSV its column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedRecord {
    #[serde(rename = "citing author name")]
    pub author_name: String,
    #[serde(rename = "citing paper title")]
    pub citing_paper: String,
    #[serde(rename = "cited paper title")]
    pub cited_paper: String,
    pub affiliation: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
}

impl LocatedRecord {
    /// Build a record with blank location fields.
    fn unlocated(record: &AffiliationRecord) -> Self {
        Self {
            author_name: record.author_name.clone(),
            citing_paper: record.citing_paper.clone(),
            cited_paper: record.cited_paper.clone(),
            affiliation: record.affiliation.clone(),
            latitude: None,
            longitude: None,
            county: String::new(),
            city: String::new(),
            state: String::new(),
            country: String::new(),
        }
    }

    /// Build a record carrying a resolved location.
    fn located(record: &AffiliationRecord, location: &GeoLocation) -> Self {
        Self {
            latitude: Some(location.latitude),
            longitude: Some(location.longitude),
            county: location.county.clone(),
            city: location.city.clone(),
            state: location.state.clone(),
            country: location.country.clone(),
            ..Self::unlocated(record)
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Labels containing any of these never reach the geocoder; they describe
/// fields of study or roles, not places. They are still recorded (with blank
/// location fields) so the user can correct them in the CSV.
const INVALID_AFFILIATION_TERMS: &[&str] = &[
    NO_AUTHOR_FOUND,
    "computer",
    "computer science",
    "electrical",
    "engineering",
    "researcher",
    "scholar",
    "inc.",
    "school",
    "department",
    "student",
    "candidate",
    "professor",
    "faculty",
    "associate",
];

/// Curated overrides: lowercase substring -> (county, city, state, country, lat, lon).
/// Bypasses the geocoder for institutions it reliably gets wrong.
const KNOWN_AFFILIATIONS: &[(&str, (&str, &str, &str, &str, f64, f64))] = &[
    ("amazon", ("King County", "Seattle", "Washington", "United States", 47.6062, -122.3321)),
    ("google", ("Santa Clara County", "Mountain View", "California", "United States", 37.4220, -122.0841)),
    ("deepmind", ("Greater London", "London", "England", "United Kingdom", 51.5332, -0.1260)),
    ("microsoft", ("King County", "Redmond", "Washington", "United States", 47.6740, -122.1215)),
    ("meta ai", ("San Mateo County", "Menlo Park", "California", "United States", 37.4530, -122.1817)),
    ("meta platforms", ("San Mateo County", "Menlo Park", "California", "United States", 37.4530, -122.1817)),
    ("facebook", ("San Mateo County", "Menlo Park", "California", "United States", 37.4530, -122.1817)),
    ("apple", ("Santa Clara County", "Cupertino", "California", "United States", 37.3349, -122.0090)),
    ("nvidia", ("Santa Clara County", "Santa Clara", "California", "United States", 37.3708, -121.9671)),
    ("openai", ("San Francisco County", "San Francisco", "California", "United States", 37.7620, -122.4148)),
    ("ibm research", ("Westchester County", "Yorktown Heights", "New York", "United States", 41.2709, -73.7774)),
    // A bare "mit" key would match every "Smith"; only the full name is safe
    ("massachusetts institute of technology", ("Middlesex County", "Cambridge", "Massachusetts", "United States", 42.3601, -71.0942)),
    ("stanford", ("Santa Clara County", "Stanford", "California", "United States", 37.4275, -122.1697)),
    ("uc berkeley", ("Alameda County", "Berkeley", "California", "United States", 37.8719, -122.2585)),
    ("carnegie mellon", ("Allegheny County", "Pittsburgh", "Pennsylvania", "United States", 40.4433, -79.9436)),
    ("eth zurich", ("", "Zurich", "Zurich", "Switzerland", 47.3763, 8.5477)),
    ("tsinghua", ("", "Beijing", "Beijing", "China", 40.0000, 116.3264)),
    ("peking university", ("", "Beijing", "Beijing", "China", 39.9869, 116.3059)),
];

/// Check if a label would only waste geocoder time.
pub fn affiliation_invalid(label: &str) -> bool {
    let lower = label.to_lowercase();
    INVALID_AFFILIATION_TERMS
        .iter()
        .any(|term| lower.contains(term))
}

/// Look up a label in the curated override table.
pub fn known_affiliation(label: &str) -> Option<GeoLocation> {
    let lower = label.to_lowercase();
    for (key, (county, city, state, country, lat, lon)) in KNOWN_AFFILIATIONS {
        if lower.contains(key) {
            return Some(GeoLocation {
                latitude: *lat,
                longitude: *lon,
                county: county.to_string(),
                city: city.to_string(),
                state: state.to_string(),
                country: country.to_string(),
            });
        }
    }
    None
}

/// Nominatim client with per-label memoization and request spacing.
pub struct GeocodeClient {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Option<GeoLocation>>>,
    last_request: Mutex<Option<Instant>>,
    base_url: String,
}

impl GeocodeClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(GEOCODER_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CitemapError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
            last_request: Mutex::new(None),
            base_url: NOMINATIM_URL.to_string(),
        })
    }

    /// Resolve a label to a location, memoized.
    ///
    /// Returns None after `MAX_ATTEMPTS` failures; never errors.
    pub async fn resolve(&self, label: &str) -> Option<GeoLocation> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        {
            let cache = self.cache.lock().ok()?;
            if let Some(cached) = cache.get(label) {
                debug!(label = label, "Geocode cache hit");
                return cached.clone();
            }
        }

        let mut resolved = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_resolve(label).await {
                Ok(Some(location)) => {
                    resolved = Some(location);
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        label = label,
                        attempt = attempt + 1,
                        error = %e,
                        "Geocode attempt failed"
                    );
                }
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(label.to_string(), resolved.clone());
        }
        resolved
    }

    /// One search + reverse round trip.
    async fn try_resolve(&self, label: &str) -> Result<Option<GeoLocation>> {
        self.wait_for_rate_limit().await;
        let Some((latitude, longitude)) = self.search(label).await? else {
            return Ok(None);
        };

        self.wait_for_rate_limit().await;
        let address = self.reverse(latitude, longitude).await?;

        Ok(Some(GeoLocation {
            latitude,
            longitude,
            county: address.county.unwrap_or_default(),
            city: address.city.unwrap_or_default(),
            state: address.state.unwrap_or_default(),
            country: address.country.unwrap_or_default(),
        }))
    }

    /// Enforce the one-request-per-second policy.
    async fn wait_for_rate_limit(&self) {
        let should_wait = {
            let last = self.last_request.lock().ok();
            last.and_then(|l| *l)
                .map(|t| t.elapsed() < MIN_REQUEST_INTERVAL)
        };

        if should_wait == Some(true) {
            tokio::time::sleep(MIN_REQUEST_INTERVAL).await;
        }

        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(Instant::now());
        }
    }

    /// Forward geocode: label -> coordinates.
    async fn search(&self, query: &str) -> Result<Option<(f64, f64)>> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CitemapError::RateLimited(5));
        }
        if !response.status().is_success() {
            return Err(CitemapError::Api {
                code: response.status().as_u16() as i32,
                message: format!("Nominatim search error: {}", response.status()),
            });
        }

        let results: Vec<SearchResult> = response.json().await?;
        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };

        let latitude = first
            .lat
            .parse::<f64>()
            .map_err(|e| CitemapError::Parse(format!("bad latitude '{}': {}", first.lat, e)))?;
        let longitude = first
            .lon
            .parse::<f64>()
            .map_err(|e| CitemapError::Parse(format!("bad longitude '{}': {}", first.lon, e)))?;
        Ok(Some((latitude, longitude)))
    }

    /// Reverse geocode: coordinates -> address parts, English names.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<ReverseAddress> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", latitude.to_string().as_str()),
                ("lon", longitude.to_string().as_str()),
                ("format", "jsonv2"),
                ("accept-language", "en"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CitemapError::Api {
                code: response.status().as_u16() as i32,
                message: format!("Nominatim reverse error: {}", response.status()),
            });
        }

        let reverse: ReverseResult = response.json().await?;
        Ok(reverse.address.unwrap_or_default())
    }
}

// === Nominatim response types ===

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResult {
    #[serde(default)]
    address: Option<ReverseAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct ReverseAddress {
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Resolve every record's affiliation, grouping by unique label.
///
/// Order of resolution per label: invalid filter (blank fields), curated
/// override, then Nominatim. A label that fails all geocode attempts keeps
/// its records with blank fields; nothing is dropped and nothing errors.
pub async fn locate_records(
    client: &GeocodeClient,
    records: &[AffiliationRecord],
) -> Vec<LocatedRecord> {
    // Unique labels in first-seen order, with their record indices
    let mut label_order: Vec<String> = Vec::new();
    let mut label_entries: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        let entries = label_entries
            .entry(record.affiliation.clone())
            .or_insert_with(|| {
                label_order.push(record.affiliation.clone());
                Vec::new()
            });
        entries.push(idx);
    }

    info!(
        labels = label_order.len(),
        records = records.len(),
        "Geocoding unique citing affiliations"
    );

    let mut located = Vec::with_capacity(records.len());
    let mut resolved_count = 0usize;

    for label in &label_order {
        let location = if affiliation_invalid(label) {
            debug!(label = %label, "Skipping invalid affiliation");
            None
        } else if let Some(known) = known_affiliation(label) {
            debug!(label = %label, "Known affiliation override");
            Some(known)
        } else {
            client.resolve(label).await
        };

        if location.is_some() {
            resolved_count += 1;
        }

        for &idx in &label_entries[label] {
            let record = &records[idx];
            located.push(match &location {
                Some(loc) => LocatedRecord::located(record, loc),
                None => LocatedRecord::unlocated(record),
            });
        }
    }

    info!(
        resolved = resolved_count,
        total = label_order.len(),
        "Converted affiliations to geocodes"
    );
    located
}

/// Sort + dedup located records for stable CSV and map output.
pub fn dedup_located(mut records: Vec<LocatedRecord>) -> Vec<LocatedRecord> {
    let key = |r: &LocatedRecord| {
        (
            r.author_name.clone(),
            r.citing_paper.clone(),
            r.cited_paper.clone(),
            r.affiliation.clone(),
            r.latitude.map(f64::to_bits),
            r.longitude.map(f64::to_bits),
        )
    };
    records.sort_by(|a, b| key(a).cmp(&key(b)));
    records.dedup_by(|a, b| key(a) == key(b));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(author: &str, affiliation: &str) -> AffiliationRecord {
        AffiliationRecord {
            author_name: author.to_string(),
            citing_paper: "Citing".to_string(),
            cited_paper: "Cited".to_string(),
            affiliation: affiliation.to_string(),
        }
    }

    #[test]
    fn test_invalid_affiliations() {
        assert!(affiliation_invalid("Department of Physics"));
        assert!(affiliation_invalid("Computer Science"));
        assert!(affiliation_invalid("PhD student"));
        assert!(affiliation_invalid(NO_AUTHOR_FOUND));
        assert!(affiliation_invalid("Associate editor"));
        assert!(!affiliation_invalid("Tsinghua University"));
        assert!(!affiliation_invalid("NVIDIA"));
    }

    #[test]
    fn test_known_affiliation_substring_match() {
        let amazon = known_affiliation("Amazon Web Services").expect("override");
        assert_eq!(amazon.city, "Seattle");
        assert_eq!(amazon.country, "United States");

        let google = known_affiliation("Google Research, Brain Team").expect("override");
        assert_eq!(google.city, "Mountain View");

        assert!(known_affiliation("University of Nowhere").is_none());
    }

    #[test]
    fn test_known_affiliation_case_insensitive() {
        assert!(known_affiliation("AMAZON").is_some());
        assert!(known_affiliation("DeepMind London").is_some());
    }

    #[test]
    fn test_known_affiliation_no_short_key_collisions() {
        assert!(known_affiliation("Smith College").is_none());
        assert!(known_affiliation("Metabolism Research Center").is_none());
    }

    #[tokio::test]
    async fn test_locate_records_invalid_and_known() {
        let client = GeocodeClient::new().expect("client");
        let records = vec![
            record("Alice", "Department of Physics"),
            record("Bob", "Google Research"),
            record("Carol", "Google Research"),
        ];

        let located = locate_records(&client, &records).await;
        assert_eq!(located.len(), 3);

        // Invalid label kept with blank fields
        assert_eq!(located[0].author_name, "Alice");
        assert!(!located[0].has_coordinates());
        assert!(located[0].country.is_empty());

        // Both Google records share the override location
        assert!(located[1].has_coordinates());
        assert_eq!(located[1].latitude, located[2].latitude);
        assert_eq!(located[1].city, "Mountain View");
    }

    #[test]
    fn test_dedup_located() {
        let base = LocatedRecord {
            author_name: "Alice".to_string(),
            citing_paper: "A".to_string(),
            cited_paper: "B".to_string(),
            affiliation: "MIT".to_string(),
            latitude: Some(42.36),
            longitude: Some(-71.09),
            county: String::new(),
            city: "Cambridge".to_string(),
            state: "Massachusetts".to_string(),
            country: "United States".to_string(),
        };
        let records = vec![base.clone(), base.clone()];
        assert_eq!(dedup_located(records).len(), 1);
    }

    #[test]
    fn test_reverse_address_parsing() {
        let json = r#"{"address":{"city":"Cambridge","state":"Massachusetts","country":"United States"}}"#;
        let parsed: ReverseResult = serde_json::from_str(json).expect("parse");
        let address = parsed.address.expect("address");
        assert_eq!(address.city.as_deref(), Some("Cambridge"));
        assert_eq!(address.county, None);
        assert_eq!(address.country.as_deref(), Some("United States"));
    }

    #[test]
    fn test_search_result_parsing() {
        let json = r#"[{"lat":"42.3601","lon":"-71.0942","display_name":"Cambridge"}]"#;
        let parsed: Vec<SearchResult> = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed[0].lat, "42.3601");
    }
}
