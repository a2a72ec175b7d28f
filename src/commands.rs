//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use vetrina::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Search { query, .. } => println!("searching for {query}"),
//!     _ => {}
//! }
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file; defaults to `<config_dir>/config.yaml`.
    #[arg(long, short = 'c', global = true, env = "VETRINA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `api_key` from the config file.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Narrowing applied to retrieved products.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
    /// Only products in this category (`all` disables the filter).
    #[arg(long)]
    pub category: Option<String>,

    /// Lowest unit price, inclusive.
    #[arg(long)]
    pub min_price: Option<f64>,

    /// Highest unit price, inclusive.
    #[arg(long)]
    pub max_price: Option<f64>,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config and the built-in templates.
    Init,

    /// Embed a catalog file and persist the index/store pair.
    #[clap(name = "build", alias = "b")]
    Build {
        /// Catalog in `.json`, `.yaml`/`.yml` or `.csv` format.
        catalog: PathBuf,
    },

    /// Show the products nearest to a query, without generating an answer.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        /// Number of nearest products to consider.
        #[arg(short = 'k')]
        k: Option<usize>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Retrieve products and ask the model for a recommendation.
    #[clap(name = "ask", alias = "a")]
    Ask {
        query: String,

        #[arg(short = 'k')]
        k: Option<usize>,

        /// Template name under `<config_dir>/templates/`.
        #[arg(name = "template", short = 't')]
        template: Option<String>,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_filters() {
        let cli = Cli::try_parse_from([
            "vetrina",
            "ask",
            "Cerco cartucce",
            "-k",
            "5",
            "-t",
            "usage_advice",
            "--category",
            "Cancelleria",
            "--max-price",
            "40",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                query,
                k,
                template,
                filters,
            } => {
                assert_eq!(query, "Cerco cartucce");
                assert_eq!(k, Some(5));
                assert_eq!(template.as_deref(), Some("usage_advice"));
                assert_eq!(filters.category.as_deref(), Some("Cancelleria"));
                assert_eq!(filters.min_price, None);
                assert_eq!(filters.max_price, Some(40.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_build_with_global_config() {
        let cli = Cli::try_parse_from(["vetrina", "b", "prodotti.csv", "--config", "/tmp/c.yaml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Commands::Build { catalog } if catalog == PathBuf::from("prodotti.csv")));
    }
}
