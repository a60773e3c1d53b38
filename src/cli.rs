use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about = "Semantic search over Facebook posts", long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, the store and the model cache.
    /// Defaults to $POSTSEARCH_BASE_PATH or ~/.local/share/postsearch
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild the post store from the CSV export.
    /// Replaces any existing store.
    Build {
        /// CSV export to index (overrides data.csv_path)
        #[clap(long)]
        csv: Option<PathBuf>,
    },
    /// Search posts
    Search {
        /// Search query (Danish or English)
        query: String,

        /// Only posts by this exact profile name
        #[clap(short, long)]
        profile: Option<String>,

        /// Minimum total interactions
        #[clap(short, long)]
        min_interactions: Option<u64>,

        /// Blend similarity with engagement
        #[clap(short, long, default_value = "false")]
        boost_interactions: bool,

        /// Number of results (defaults to search.top_k)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List indexed profiles
    Profiles {},
    /// Serve the web feed
    Serve {
        /// Address to listen on (overrides web.listen)
        #[clap(long)]
        listen: Option<String>,
    },
}
