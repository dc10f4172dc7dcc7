//! Movies ETL - incremental movie metadata loader

use anyhow::Result;
use clap::Parser;
use movies_common::logging::{init_logging, LogConfig, LogLevel};
use movies_etl::cli::{Cli, Commands};
use movies_etl::pipeline::{check_source, Pipeline, PipelineOutcome};
use movies_etl::transform::{csv_to_json, json_to_csv};
use movies_etl::watermark::WatermarkStore;
use movies_etl::{db, notify, EtlConfig};
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("movies-etl")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = EtlConfig::load()?;

    match cli.command {
        Commands::Run { source, cursor } => {
            if let Some(source) = source {
                config.source_path = source;
            }
            if let Some(cursor) = cursor {
                config.cursor = cursor;
            }
            config.validate()?;

            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            let notifier = notify::notifier_from_config(&config.alerts)?;

            let outcome = Pipeline::new(config, pool, notifier).run().await?;
            println!("{}", outcome.report().summary());

            if let PipelineOutcome::ValidationFailed { errors, .. } = outcome {
                for error in &errors {
                    println!("  - {}", error);
                }
                return Ok(ExitCode::from(2));
            }
        },
        Commands::Validate { source } => {
            let source = source.unwrap_or(config.source_path);
            let errors = check_source(&source)?;

            if errors.is_empty() {
                println!("{}: no validation errors", source.display());
            } else {
                println!("{}: {} validation error(s)", source.display(), errors.len());
                for error in &errors {
                    println!("  - {}", error);
                }
                return Ok(ExitCode::from(2));
            }
        },
        Commands::CsvToJson { input, output } => {
            let rows = csv_to_json(&input, &output)?;
            println!("Wrote {} rows to {}", rows, output.display());
        },
        Commands::JsonToCsv { input, output } => {
            let rows = json_to_csv(&input, &output)?;
            println!("Wrote {} rows to {}", rows, output.display());
        },
        Commands::Watermark { cursor } => {
            let store = WatermarkStore::new(cursor.unwrap_or(config.cursor));
            let pool = db::create_pool(&config.database).await?;
            let mut conn = pool.acquire().await?;

            match store.get(&mut conn).await? {
                Some(value) => println!("{} = {}", store.kind().key(), value),
                None => println!("{} is not set (initial value {})", store.kind().key(), store.kind().initial()),
            }
        },
        Commands::Migrate => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            info!("Migrations complete");
        },
    }

    Ok(ExitCode::SUCCESS)
}
