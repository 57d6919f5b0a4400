use crate::table::column::ColumnSchema;
use clap::Parser;
use std::path::PathBuf;

/// Command line options, each also readable from a `TYPED_SHEET_*`
/// environment variable (a `.env` file in the working directory is honoured).
#[derive(Parser, Debug)]
#[command(name = "typed-sheet", version, about = "Extract typed columns from an Excel worksheet as JSON")]
pub struct Config {
    /// Workbook to read (.xlsx or .xlsm)
    #[arg(long, env = "TYPED_SHEET_FILE")]
    pub file: PathBuf,

    /// Worksheet name
    #[arg(long, env = "TYPED_SHEET_SHEET", default_value = "Sheet1")]
    pub sheet: String,

    /// Column to extract as NAME[:TYPE], where TYPE is string, number, boolean or date.
    /// Repeat the flag, or separate columns with commas.
    #[arg(
        long = "column",
        env = "TYPED_SHEET_COLUMNS",
        value_delimiter = ',',
        required = true
    )]
    pub columns: Vec<ColumnSchema>,

    /// Log every cell that could not be converted
    #[arg(long)]
    pub report: bool,
}
