use clap::{Parser as ClapParser, Subcommand};
use std::path::PathBuf;

#[derive(ClapParser, Debug)]
#[command(
    author,
    version,
    about = "Keep a search index in sync with wiki content",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a wiki content model into the in-memory store and print the result
    Resync {
        /// JSON file holding the content model ({"wikis": {...}})
        #[arg(short = 'c', long)]
        content: PathBuf,

        /// Root to resync, e.g. `xwiki`, `xwiki:Main` or `xwiki:Main.WebHome`.
        /// Every wiki of the content model when omitted
        #[arg(short, long)]
        root: Option<String>,

        /// Delete everything indexed under the root before indexing it
        #[arg(long)]
        purge: bool,

        /// TOML configuration file, overrides the default lookup
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only print the summary, not the indexed documents
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file, overrides the default lookup
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
