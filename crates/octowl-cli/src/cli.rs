use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octowl")]
#[command(about = "octowl CLI: inspect modality worklist folders and dataset files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize every dataset file in a worklist folder
    List(ListArgs),
    /// Print the element tree of one dataset file
    Dump(DumpArgs),
}

#[derive(clap::Args)]
pub struct ListArgs {
    /// Worklist data folder
    #[arg(default_value = "./worklist/")]
    pub folder: PathBuf,
}

#[derive(clap::Args)]
pub struct DumpArgs {
    /// Part-10 dataset file
    pub file: PathBuf,
}
