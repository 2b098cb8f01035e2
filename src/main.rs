//! citemap - Citation world map generator for Google Scholar profiles
//!
//! Scrapes a profile's citation graph, resolves citing authors' affiliations
//! to coordinates, and renders a world map of citation provenance.
//!
//! ## Usage
//!
//! ```bash
//! citemap generate j8xkbCIAAAAJ
//! citemap generate j8xkbCIAAAAJ --from-csv
//! citemap cookies path
//! ```

use anyhow::Result;
use citemap::affiliation::CleaningPolicy;
use citemap::pipeline::{self, PipelineConfig};
use citemap::session::{CookieManager, SessionOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Citation world map generator for Google Scholar profiles
#[derive(Parser)]
#[command(name = "citemap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a profile's citation graph and render the world map
    Generate {
        /// Google Scholar profile id (the `user=` URL parameter)
        scholar_id: String,

        /// Map output file name
        #[arg(long, default_value = "citation_map.html")]
        output: String,

        /// CSV output file name
        #[arg(long, default_value = "citation_info.csv")]
        csv: String,

        /// Rebuild the map from the exported CSV, skipping all scraping
        #[arg(long)]
        from_csv: bool,

        /// Resume from the stage caches of an interrupted run
        #[arg(long)]
        resume: bool,

        /// Cache directory; outputs land in <cache-dir>/<scholar-id>/
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Keep raw affiliation lines instead of cleaning them
        #[arg(long)]
        conservative: bool,

        /// Use a single pin color instead of the palette
        #[arg(long)]
        plain_pins: bool,

        /// Suppress the author/affiliation listing
        #[arg(long)]
        quiet_affiliations: bool,

        /// Publication-list pages to fetch (100 publications each)
        #[arg(long, default_value = "10")]
        max_pages: usize,

        /// Citing-result pages to fetch per publication (10 results each)
        #[arg(long, default_value = "10")]
        citing_pages: usize,

        /// Proxy URL (e.g., http://127.0.0.1:7890)
        #[arg(long)]
        proxy: Option<String>,

        /// Mirror site URL
        #[arg(long)]
        mirror: Option<String>,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Generate {
            scholar_id,
            output,
            csv,
            from_csv,
            resume,
            cache_dir,
            conservative,
            plain_pins,
            quiet_affiliations,
            max_pages,
            citing_pages,
            proxy,
            mirror,
        } => {
            let config = PipelineConfig {
                scholar_id,
                map_file: output,
                csv_file: csv,
                from_csv,
                resume,
                cache_dir,
                policy: if conservative {
                    CleaningPolicy::Conservative
                } else {
                    CleaningPolicy::Aggressive
                },
                colorful_pins: !plain_pins,
                print_affiliations: !quiet_affiliations,
                max_pages,
                citing_pages,
                session: SessionOptions {
                    proxy,
                    base_url: mirror,
                    cookie_path: None,
                },
            };

            pipeline::generate_citation_map(&config).await?;
            Ok(())
        }
        Commands::Cookies { action } => handle_cookies(action),
    }
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: CookieAction) -> Result<()> {
    let manager = CookieManager::new()?;

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
            println!();
            println!("To export cookies: open https://scholar.google.com in your browser,");
            println!("complete any CAPTCHA, then save the site cookies to the file above as");
            println!("a JSON array: [{{\"name\":\"NID\",\"value\":\"...\",\"domain\":\".google.com\"}}]");
        }
    }

    Ok(())
}
