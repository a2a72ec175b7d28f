//! Main module for the Vetrina CLI application (`vetrina`).
//!
//! A thin, stateless presentation layer over the library: every invocation
//! loads the config, does one thing and exits.
//!
//! # Examples
//!
//! ```sh
//! vetrina init
//! vetrina build prodotti.csv
//! vetrina search "etichette adesive" -k 3 --category Cancelleria
//! vetrina ask "Mi serve un evidenziatore" --max-price 25
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor, Stylize},
};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    io::{Write, stdout},
    path::Path,
    sync::Arc,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use vetrina::{
    api::{OpenAiGenerator, RecommendRequest, recommend},
    catalog::load_catalog,
    catalog_index::{CatalogHandle, CatalogIndex},
    commands::{Cli, Commands, FilterArgs},
    config::{RecommenderConfig, load_config},
    config_dir,
    embedding::OpenAiEmbedder,
    error::RecommendError,
    retrieval::{PriceRange, RetrievalResult, Retriever},
    retry::RetryPolicy,
    template::{RecommendationTemplate, load_template, write_template},
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Parses arguments, loads configuration and dispatches the subcommand.
async fn run() -> Result<(), Box<dyn Error>> {
    let Cli {
        config,
        api_key,
        command,
    } = Cli::parse();
    let config_path = match config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };

    let load = || -> Result<RecommenderConfig, Box<dyn Error>> {
        debug!("Loading config from: {}", config_path.display());
        let mut config = load_config(&config_path)?;
        if let Some(key) = &api_key {
            config.api_key = key.clone();
        }
        Ok(config)
    };

    match command {
        Commands::Init => {
            debug!("Initializing configuration");
            init(&config_path)?;
        }
        Commands::Build { catalog } => build(&load()?, &catalog).await?,
        Commands::Search { query, k, filters } => {
            let config = load()?;
            let retriever = retriever(&config)?;
            let products = retriever
                .retrieve(
                    &query,
                    k.unwrap_or(config.default_k),
                    filters.category.as_deref(),
                    price_range(&filters)?,
                )
                .await
                .map_err(report)?;
            print_products(&products)?;
        }
        Commands::Ask {
            query,
            k,
            template,
            filters,
        } => {
            let config = load()?;
            let template = load_template(template.as_deref().unwrap_or(&config.template))?;
            let retriever = retriever(&config)?;
            let generator = OpenAiGenerator::from_config(&config)?;
            let request = RecommendRequest::new(&query, k.unwrap_or(config.default_k))
                .category(filters.category.as_deref())
                .price(price_range(&filters)?);

            let answer = recommend(&retriever, &generator, &template, &config, request)
                .await
                .map_err(report)?;
            print_products(&answer.products)?;
            print_answer(&answer.response)?;
        }
    }

    Ok(())
}

async fn build(config: &RecommenderConfig, catalog: &Path) -> Result<(), Box<dyn Error>> {
    let records = load_catalog(catalog)?;
    let embedder = OpenAiEmbedder::from_config(config)?;

    let bar = ProgressBar::new(records.len() as u64).with_style(ProgressStyle::with_template(
        "{spinner} [{pos}/{len}] Embedding catalog {wide_bar}",
    )?);

    let built = CatalogIndex::from_records(
        &records,
        &embedder,
        config.build_concurrency,
        &RetryPolicy::from_config(config),
        &bar,
    )
    .await?;
    built.persist(&config.index_path, &config.store_path)?;

    println!(
        "Indexed {} products into {} and {}",
        built.len(),
        config.index_path.display(),
        config.store_path.display()
    );
    Ok(())
}

fn retriever(config: &RecommenderConfig) -> Result<Retriever, Box<dyn Error>> {
    let catalog = CatalogIndex::load(&config.index_path, &config.store_path)?;
    Ok(Retriever::new(
        Arc::new(OpenAiEmbedder::from_config(config)?),
        Arc::new(CatalogHandle::new(catalog)),
        RetryPolicy::from_config(config),
    ))
}

fn price_range(filters: &FilterArgs) -> Result<Option<PriceRange>, Box<dyn Error>> {
    Ok(PriceRange::from_bounds(filters.min_price, filters.max_price)?)
}

/// The retry-later line shown when the embedding or chat service is down.
fn unavailable_notice(err: &RecommendError) -> Option<String> {
    err.is_unavailable()
        .then(|| "Servizio non disponibile, riprova più tardi.".to_string())
}

fn report(err: RecommendError) -> Box<dyn Error> {
    if let Some(notice) = unavailable_notice(&err) {
        eprintln!("{}", notice.yellow().bold());
    }
    err.into()
}

fn print_products(products: &RetrievalResult) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    out.execute(SetForegroundColor(Color::Cyan))?;
    out.execute(SetAttribute(Attribute::Bold))?;
    writeln!(out, "Prodotti consigliati:")?;
    out.execute(SetAttribute(Attribute::Reset))?;
    out.execute(SetForegroundColor(Color::Reset))?;

    if products.is_empty() {
        writeln!(out, "  (nessun prodotto corrisponde ai filtri)")?;
    }
    for (i, product) in products.iter().enumerate() {
        writeln!(out, "{}. {}", i + 1, product.entry.text)?;
        debug!("  distance {:.4}", product.distance);
    }
    Ok(())
}

fn print_answer(response: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    writeln!(out)?;
    out.execute(SetForegroundColor(Color::Yellow))?;
    writeln!(out, "{response}")?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

/// Writes a default config and both built-in templates.
///
/// An existing config is left alone; templates are always rewritten.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let templates_dir = config_dir()?.join("templates");
    info!("Creating template config directory: {}", templates_dir.display());
    fs::create_dir_all(&templates_dir)?;

    for (name, template) in RecommendationTemplate::builtins() {
        let path = templates_dir.join(format!("{name}.yaml"));
        info!("Creating template file: {}", path.display());
        write_template(&path, &template)?;
    }

    if config_path.exists() {
        info!("Keeping existing config file: {}", config_path.display());
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Creating config file: {}", config_path.display());
    let config = RecommenderConfig {
        api_key: "CHANGEME".to_string(),
        ..Default::default()
    };
    fs::write(config_path, serde_yaml::to_string(&config)?)?;

    Ok(())
}
