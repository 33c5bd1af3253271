use std::path::PathBuf;

use clap::{Args, Parser};

use crate::reports::ReportKind;

#[derive(Debug, Parser)]
#[command(
    name = "trendmail",
    version,
    about = "Daily warehouse trend reports by email"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Day to report on; defaults to yesterday.
    #[arg(long, value_name = "YYYYMMDD")]
    pub date: Option<String>,

    /// Generate a single report type instead of all of them.
    #[arg(long, value_enum, value_name = "REPORT")]
    pub only: Option<ReportKind>,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Where daily snapshots live; defaults to ~/bq_data.
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}
