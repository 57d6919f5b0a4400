use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::debug;
use log::warn;
use typed_sheet::config::Config;
use typed_sheet::read_table_report;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    match dotenv {
        Ok(path) => debug!("Loaded environment from '{}'", path.display()),
        Err(error) if error.not_found() => (),
        Err(error) => warn!("Ignoring .env file: {error}"),
    }

    let config = Config::parse();
    let report = read_table_report(&config.file, &config.sheet, &config.columns)
        .await
        .with_context(|| format!("Cannot extract sheet '{}'", config.sheet))?;

    if config.report {
        for failure in &report.failures {
            warn!("Row {}, column '{}': {}", failure.row + 1, failure.column, failure.error);
        }
    }
    println!("{}", serde_json::to_string_pretty(&report.rows)?);
    Ok(())
}
