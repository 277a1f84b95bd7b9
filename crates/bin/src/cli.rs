//! CLI argument definitions for the sysdata binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sysdata::record::{Direction, LeafNameType};

/// Direction of a backend view
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    /// Values coming from the backend
    From,
    /// Values sent onto the backend
    Onto,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::From => Direction::From,
            DirectionArg::Onto => Direction::Onto,
        }
    }
}

/// Naming style of listed leaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum NameStyle {
    #[default]
    Default,
    /// Backend field names
    System,
    /// Canonical field names
    Field,
    /// Flat root paths (`B0X`)
    Root,
    /// Root paths ending in the backend name
    SystemPath,
    /// Separated root paths (`B/0/X`)
    Path,
}

impl From<NameStyle> for LeafNameType {
    fn from(style: NameStyle) -> Self {
        match style {
            NameStyle::Default => LeafNameType::Default,
            NameStyle::System => LeafNameType::System,
            NameStyle::Field => LeafNameType::Field,
            NameStyle::Root => LeafNameType::Root,
            NameStyle::SystemPath => LeafNameType::SystemPath,
            NameStyle::Path => LeafNameType::Path,
        }
    }
}

/// Sysdata record tool
#[derive(Parser, Debug)]
#[command(name = "sysdata")]
#[command(about = "Sysdata: inspect records and exchange their values with backend views")]
#[command(version)]
pub struct Cli {
    /// Log filter directives (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "sysdata=info", env = "SYSDATA_LOG")]
    pub log: String,

    /// Print JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the leaf names of a record
    Leafs(LeafsArgs),
    /// Pull backend values into a record
    Pull(PullArgs),
    /// Push the values of a record onto its backend view
    Push(PushArgs),
    /// Compare the leaves of two records
    Compare(CompareArgs),
}

/// Backend selection shared by the commands
#[derive(clap::Args, Debug, Clone)]
pub struct SchemaArgs {
    /// JSON schema declaring the backend view
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Backend system id; defaults to the system of the schema
    #[arg(long, env = "SYSDATA_SYSTEM")]
    pub system: Option<String>,
}

/// Arguments for the leafs command
#[derive(clap::Args, Debug)]
pub struct LeafsArgs {
    /// JSON record file
    pub record: PathBuf,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Direction of the listed backend view
    #[arg(short, long, default_value = "from")]
    pub direction: DirectionArg,

    /// Naming style
    #[arg(short, long, default_value = "default")]
    pub names: NameStyle,

    /// Only list these backend names
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,
}

/// Arguments for the pull command
#[derive(clap::Args, Debug)]
pub struct PullArgs {
    /// JSON record file
    pub record: PathBuf,

    /// JSON object of backend values, keyed by backend name or record path
    pub values: PathBuf,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Write the pulled record here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the push command
#[derive(clap::Args, Debug)]
pub struct PushArgs {
    /// JSON record file
    pub record: PathBuf,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Also export empty values
    #[arg(long)]
    pub empty: bool,
}

/// Arguments for the compare command
#[derive(clap::Args, Debug)]
pub struct CompareArgs {
    /// JSON record file
    pub left: PathBuf,

    /// JSON record file to compare with
    pub right: PathBuf,

    /// Only compare these fields
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Skip these fields
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
}
