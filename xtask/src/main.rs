//! Build automation tasks for the movies ETL workspace
//!
//! Currently generates the CLI reference from the `clap` definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for the movies ETL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<movies_etl::Cli>();

    let content = format!(
        r#"# movies-etl CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Create the schema
movies-etl migrate

# Load everything newer than the stored watermark
movies-etl run --source data/imdb_movies_final.csv

# Dry run: extract, clean and validate only
movies-etl validate

# Inspect the watermark
movies-etl watermark --cursor date
```

## Commands

{}

## Environment Variables

- `ETL_SOURCE_PATH` - Source CSV (default: `data/imdb_movies_final.csv`)
- `ETL_STAGING_DIR` - Root of `raw/` and `processed/` artifacts, empty to disable (default: `data`)
- `ETL_CURSOR` - `date` or `year` (default: `date`)
- `ETL_PIPELINE_NAME` - Pipeline name and lock key (default: `movies_etl_pipeline`)
- `ETL_INSERT_CHUNK_SIZE` - Rows per multi-row insert (default: `1000`)
- `ETL_ALERT_RECIPIENT` - Operator address (default: `admin@example.com`)
- `ETL_ALERT_WEBHOOK_URL` - POST alerts here; log-only when unset
- `ETL_ALERT_TIMEOUT` - Webhook timeout in seconds (default: `10`)
- `DATABASE_URL` - Postgres connection string (default: `postgresql://localhost/movies`)
- `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_CONNECT_TIMEOUT`, `DB_IDLE_TIMEOUT` - Pool settings
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging

## Exit Codes

- `0` - success, including runs with nothing new to load
- `1` - the run failed and was rolled back
- `2` - validation rejected the batch

---

*To update, run `cargo run -p xtask -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
