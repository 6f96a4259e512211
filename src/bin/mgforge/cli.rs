use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use matgraph_forge::Element;

#[derive(Parser)]
#[command(
    name = "mgforge",
    about = "Graph dataset materialization for materials property models",
    version,
    author,
    before_help = crate::display::banner_for_help(),
    propagate_version = true
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert an extended-XYZ file into a cached graph dataset
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// Fit per-element reference offsets for a property
    #[command(visible_alias = "f")]
    Fit(FitArgs),

    /// Summarize a cached dataset and dry-run its loaders
    #[command(visible_alias = "i")]
    Info(InfoArgs),
}

impl Command {
    pub fn quiet(&self) -> bool {
        match self {
            Command::Build(args) => args.quiet,
            Command::Fit(args) => args.quiet,
            Command::Info(args) => args.quiet,
        }
    }
}

/// Options that shape how structures become graphs.
#[derive(Args)]
#[command(next_help_heading = "Pipeline")]
pub struct PipelineOptions {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Property used as the label
    #[arg(short, long, value_name = "NAME")]
    pub label: Option<String>,

    /// One-hot element order, comma separated (inferred from the input if omitted)
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub elements: Vec<Element>,

    /// Neighbor cutoff radius (Å)
    #[arg(long, value_name = "Å")]
    pub cutoff: Option<f64>,
}

/// Where the cached graphs and state attributes live.
#[derive(Args)]
#[command(next_help_heading = "Cache")]
pub struct CacheOptions {
    /// Directory holding both cache files under their default names
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Graph cache file (overrides --cache-dir)
    #[arg(long = "graph-file", value_name = "FILE")]
    pub graph_file: Option<PathBuf>,

    /// State attribute cache file (overrides --cache-dir)
    #[arg(long = "attr-file", value_name = "FILE")]
    pub attr_file: Option<PathBuf>,
}

/// Bond length expansion options.
#[derive(Args)]
#[command(next_help_heading = "Bond Expansion")]
pub struct ExpansionOptions {
    /// Number of Gaussian centers
    #[arg(long = "num-centers", value_name = "N")]
    pub num_centers: Option<usize>,

    /// Gaussian width σ (Å)
    #[arg(long = "rbf-width", value_name = "σ")]
    pub width: Option<f64>,

    /// Last Gaussian center (Å)
    #[arg(long = "rbf-final", value_name = "Å")]
    pub r#final: Option<f64>,
}

/// Loader options for the dry run.
#[derive(Args)]
#[command(next_help_heading = "Loader")]
pub struct LoaderOptions {
    /// Graphs per batch
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<usize>,

    /// Background collation workers (0 collates inline)
    #[arg(long = "workers", value_name = "N")]
    pub num_workers: Option<usize>,

    /// Seed for the split and the training shuffle
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Extended-XYZ input file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineOptions,

    #[command(flatten)]
    pub expansion: ExpansionOptions,

    #[command(flatten)]
    pub cache: CacheOptions,

    /// Rebuild even if a cache already exists
    #[arg(long)]
    pub force: bool,

    /// Suppress progress output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct FitArgs {
    /// Extended-XYZ input file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineOptions,

    /// Fit one offset row per state, reading one property per state (comma separated)
    #[arg(long = "states", value_name = "KEYS", value_delimiter = ',')]
    pub states: Vec<String>,

    /// Offset table output (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress progress output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub pipeline: PipelineOptions,

    #[command(flatten)]
    pub cache: CacheOptions,

    #[command(flatten)]
    pub loader: LoaderOptions,

    /// Skip the loader dry run
    #[arg(long = "no-loaders")]
    pub no_loaders: bool,

    /// Suppress progress output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_parses_element_list_and_cache_dir() {
        let cli = Cli::try_parse_from([
            "mgforge",
            "build",
            "data.xyz",
            "--elements",
            "H,C,O",
            "--cache-dir",
            "out",
            "-q",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.pipeline.elements, vec![Element::H, Element::C, Element::O]);
        assert_eq!(args.cache.dir, Some(PathBuf::from("out")));
        assert!(args.quiet);
    }

    #[test]
    fn fit_accepts_state_keys_and_alias() {
        let cli = Cli::try_parse_from(["mgforge", "f", "data.xyz", "--states", "e0,e1"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.states, vec!["e0".to_string(), "e1".to_string()]);
        assert!(args.output.is_none());
    }

    #[test]
    fn unknown_element_is_a_usage_error() {
        assert!(Cli::try_parse_from(["mgforge", "build", "x.xyz", "-e", "Xx"]).is_err());
    }
}
