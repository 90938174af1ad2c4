use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "sellout")]
#[command(
    author,
    version = version_info(),
    about = "Incremental snapshot synchronizer for ticketing data"
)]
#[command(after_help = "Examples:
  sellout migrate
  sellout sync --snapshot-dir /srv/crawler
  sellout sync --limit 10 --dictionaries /srv/crawler/dictionaries
  sellout watermark
  sellout stats

Locations not given as flags are read from ~/.config/sellout/sellout.toml")]
pub struct Config {
    /// PostgreSQL database connection URL (required by every command but watermark)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply every crawler snapshot at or after the watermark
    #[command(after_help = "Examples:
  sellout sync                                  # Locations from sellout.toml
  sellout sync --snapshot-dir /srv/crawler      # Override the snapshot root
  sellout sync --config ~/custom.toml           # Use custom config file
  sellout sync --limit 24                       # Apply at most 24 snapshots
  sellout sync --skip-dictionaries              # Leave formats/categories alone")]
    Sync {
        #[command(flatten)]
        locations: LocationArgs,

        /// Directory holding formats.json and subcategories.json
        #[arg(long, value_name = "DIR")]
        dictionaries: Option<PathBuf>,

        /// Prefix under the snapshot root that holds page files
        #[arg(long, value_name = "PREFIX")]
        location: Option<String>,

        /// Apply at most this many pending snapshots
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,

        /// Do not refresh dictionaries before applying snapshots
        #[arg(long)]
        skip_dictionaries: bool,
    },
    /// Refresh the format and category dictionaries only
    #[command(after_help = "Example: sellout dictionaries --dir /srv/crawler/dictionaries")]
    Dictionaries {
        /// Directory holding formats.json and subcategories.json
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Custom path to sellout.toml configuration file
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Apply the embedded database schema
    Migrate,
    /// Print the current watermark
    Watermark {
        #[command(flatten)]
        locations: LocationArgs,
    },
    /// Show database statistics
    Stats,
}

/// Flags locating the crawler output and the watermark file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Custom path to sellout.toml configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory of the crawler output
    #[arg(long, value_name = "DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// File holding the watermark (default: <snapshot-dir>/watermark)
    #[arg(long, value_name = "FILE")]
    pub watermark: Option<PathBuf>,
}
