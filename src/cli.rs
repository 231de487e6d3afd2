use clap::Parser;
use std::path::PathBuf;

/// Cook a sprite node graph once and print what it produced
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Graph file (JSON) to cook
    #[arg(value_name = "GRAPH", required_unless_present = "list_types")]
    pub graph: Option<PathBuf>,

    /// Time cursor in milliseconds
    #[arg(short = 't', long = "time", value_name = "MS", default_value_t = 0.0)]
    pub time: f64,

    /// Node to cook (absolute path)
    #[arg(short = 'n', long = "target", value_name = "PATH", default_value = "/")]
    pub target: String,

    /// Engine configuration file (overrides SPRITECOOK_CONFIG)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the graph back after cooking (normalized, defaults filled in)
    #[arg(short = 's', long = "save", value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// Print every node's status after cooking
    #[arg(long = "nodes")]
    pub show_nodes: bool,

    /// List operator type tags and exit
    #[arg(long = "types")]
    pub list_types: bool,

    /// Enable debug logging to file (default: spritecook.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
