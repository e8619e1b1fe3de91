//! Command-line arguments and subcommands of the `stlr` tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "stlr",
    version,
    about = "Compile STLR grammars and parse text with them."
)]
pub struct StlrArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log level written to stderr (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: log::LevelFilter,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a grammar, or every `.stlr` file below a directory.
    Check {
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Print the compiled rules of a grammar.
    Rules {
        #[arg(required = true)]
        grammar: PathBuf,
    },
    /// Parse an input file with a grammar and print the tree.
    Parse {
        #[arg(required = true)]
        grammar: PathBuf,
        #[arg(required = true)]
        input: PathBuf,

        /// Start from this declaration instead of the grammar's roots.
        #[arg(long)]
        root: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Tree)]
        format: Format,

        /// Print top-level nodes as they are matched.
        #[arg(long)]
        stream: bool,

        /// Deepest rule nesting before parsing stops.
        #[arg(long, default_value_t = 1000)]
        max_depth: usize,

        /// Disable the packrat memo.
        #[arg(long)]
        no_memo: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Tree,
    Json,
    Yaml,
}
