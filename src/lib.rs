//! # citemap
//!
//! Citation world map generator for Google Scholar profiles.
//!
//! ## Modules
//!
//! - [`session`] - Scholar HTTP session and cookie persistence
//! - [`profile`] - Publication list and author profile scraping
//! - [`citations`] - Citing-author discovery per publication
//! - [`affiliation`] - Affiliation string cleaning
//! - [`countries`] - Country name lookup for the affiliation splitter
//! - [`geocode`] - Nominatim geocoding with overrides
//! - [`export`] - CSV export/import
//! - [`map`] - Leaflet map rendering
//! - [`cache`] - Stage caches
//! - [`pipeline`] - Stage orchestration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use citemap::affiliation::CleaningPolicy;
//! use citemap::pipeline::{generate_citation_map, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         scholar_id: "j8xkbCIAAAAJ".to_string(),
//!         map_file: "citation_map.html".to_string(),
//!         csv_file: "citation_info.csv".to_string(),
//!         from_csv: false,
//!         resume: false,
//!         cache_dir: "cache".into(),
//!         policy: CleaningPolicy::Aggressive,
//!         colorful_pins: true,
//!         print_affiliations: true,
//!         max_pages: 10,
//!         citing_pages: 10,
//!         session: Default::default(),
//!     };
//!     let stats = generate_citation_map(&config).await?;
//!     println!("{} citing authors located", stats.authors);
//!     Ok(())
//! }
//! ```

pub mod affiliation;
pub mod cache;
pub mod citations;
pub mod countries;
pub mod error;
pub mod export;
pub mod geocode;
pub mod map;
pub mod pipeline;
pub mod profile;
pub mod session;

pub use error::{CitemapError, Result};
