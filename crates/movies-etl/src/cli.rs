//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::watermark::CursorKind;

/// Incremental movie metadata ETL
#[derive(Parser, Debug)]
#[command(name = "movies-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply migrations and run the pipeline once
    Run {
        /// Source CSV file (overrides ETL_SOURCE_PATH)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Incremental cursor: date or year (overrides ETL_CURSOR)
        #[arg(short, long)]
        cursor: Option<CursorKind>,
    },

    /// Extract, transform and validate without touching the database
    Validate {
        /// Source CSV file (overrides ETL_SOURCE_PATH)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Convert a CSV file to JSON Lines
    CsvToJson {
        /// Input CSV file
        input: PathBuf,

        /// Output JSON Lines file
        output: PathBuf,
    },

    /// Convert a JSON Lines file to CSV
    JsonToCsv {
        /// Input JSON Lines file
        input: PathBuf,

        /// Output CSV file
        output: PathBuf,
    },

    /// Show the stored watermark
    Watermark {
        /// Cursor whose watermark to show (overrides ETL_CURSOR)
        #[arg(short, long)]
        cursor: Option<CursorKind>,
    },

    /// Apply database migrations
    Migrate,
}
