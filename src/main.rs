use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod posts;
mod render;
mod semantic;
#[cfg(test)]
mod tests;
mod web;
use cli::{Command, OutputFormat};
use config::Config;
use posts::{LoaderOptions, RecordLoader};
use semantic::{IndexBuilder, SearchRequest, SearchService};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries results, logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let base_path = match args.base_path {
        Some(path) => path,
        None => Config::default_base_path()?,
    };
    let config = Config::load_with(&base_path)
        .with_context(|| format!("failed to load config from {}", base_path.display()))?;
    let service = SearchService::new(&config)?;

    match args.command {
        Command::Build { csv } => {
            let csv_path = match csv {
                Some(path) => path,
                None => config.csv_path()?,
            };
            let options = LoaderOptions {
                min_meaningful_chars: config.data.min_meaningful_chars,
            };
            let loader = RecordLoader::open(&csv_path, options)?;
            let builder = IndexBuilder::new(config.build.batch_size).with_progress(true);

            let report = service.rebuild(&loader, &builder)?;
            println!(
                "Indexed {} posts into {} in {:.1}s",
                report.indexed,
                service.store_dir().display(),
                report.elapsed.as_secs_f64()
            );
        }

        Command::Search {
            query,
            profile,
            min_interactions,
            boost_interactions,
            top_k,
            format,
        } => {
            let request = SearchRequest {
                query,
                profile,
                min_interactions,
                top_k: top_k.unwrap_or(service.default_top_k()),
                boost_interactions,
            };
            let hits = service.search(&request)?;

            let mut stdout = std::io::stdout().lock();
            match format {
                OutputFormat::Text => render::write_text(&mut stdout, request.query.trim(), &hits)?,
                OutputFormat::Json => render::write_json(&mut stdout, &hits)?,
            }
        }

        Command::Profiles {} => {
            let profiles = service.profiles()?;
            let mut stdout = std::io::stdout().lock();
            for profile in &profiles {
                writeln!(stdout, "{profile}")?;
            }
            log::info!("{} profiles", profiles.len());
        }

        Command::Serve { listen } => {
            let listen = match listen {
                Some(addr) => addr
                    .parse::<std::net::SocketAddr>()
                    .with_context(|| format!("invalid listen address '{addr}'"))?,
                None => config.listen_addr()?,
            };

            // fail before binding when the store or model is unusable
            service.initialize()?;
            web::start_server(service, listen)?;
        }
    }

    Ok(())
}
