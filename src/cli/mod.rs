//! The `stlr` command-line interface.
//!
//! Every handler reports its own diagnostics and answers whether the command
//! succeeded; `run` turns that into the process exit code.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::{info, warn};
use walkdir::WalkDir;

use crate::cli::args::{Command, Format, StlrArgs};
use crate::cli::output::{print_checked, print_node, print_rules, print_tree};
use crate::engine::EngineConfig;
use crate::errors::{print_error, ErrorKind, SourceContext, Span, StlrError};
use crate::stlr::{compile, Grammar};
use crate::tree::Node;

pub mod args;
pub mod output;

/// Entry point of the binary.
pub fn run() {
    let args = StlrArgs::parse();
    init_logging(args.log_level);

    let result = match args.command {
        Command::Check { path } => handle_check(&path),
        Command::Rules { grammar } => handle_rules(&grammar),
        Command::Parse {
            grammar,
            input,
            root,
            format,
            stream,
            max_depth,
            no_memo,
        } => {
            let config = EngineConfig::default()
                .with_max_depth(max_depth)
                .with_memoize(!no_memo);
            handle_parse(&grammar, &input, root.as_deref(), format, stream, config)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(error) => {
            eprintln!("{}", error);
            process::exit(1);
        }
    }
}

fn init_logging(level: log::LevelFilter) {
    // A second initialisation only happens in tests and is harmless.
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}

// ============================================================================
// HANDLERS
// ============================================================================

fn handle_check(path: &Path) -> Result<bool, StlrError> {
    let files = grammar_files(path);
    if files.is_empty() {
        warn!("no .stlr files found under {}", path.display());
    }

    let mut ok = true;
    for file in files {
        match load_grammar(&file)? {
            Some(grammar) => {
                print_checked(&file.display().to_string(), &grammar).map_err(stdout_error)?
            }
            None => ok = false,
        }
    }
    Ok(ok)
}

fn handle_rules(path: &Path) -> Result<bool, StlrError> {
    let Some(grammar) = load_grammar(path)? else {
        return Ok(false);
    };
    print_rules(&grammar).map_err(stdout_error)?;
    Ok(true)
}

fn handle_parse(
    grammar: &Path,
    input: &Path,
    root: Option<&str>,
    format: Format,
    stream: bool,
    config: EngineConfig,
) -> Result<bool, StlrError> {
    let Some(grammar) = load_grammar(grammar)? else {
        return Ok(false);
    };
    let language = match root {
        Some(name) => grammar.language_from(name).ok_or_else(|| {
            StlrError::new(
                ErrorKind::UndefinedIdentifier {
                    identifier: name.to_string(),
                },
                Span::at(0),
            )
        })?,
        None => grammar.language(),
    }
    .with_config(config);

    let context = read_source(input)?;
    info!("parsing {} with {} root(s)", context.name, language.roots().len());

    if stream {
        for item in language.token_stream(context.content.clone()) {
            match item {
                Ok(node) => print_node(node, &context.content, format).map_err(stdout_error)?,
                Err(error) => {
                    print_error(error, &context);
                    return Ok(false);
                }
            }
        }
        return Ok(true);
    }

    let output = match language.parse::<Node>(context.content.clone()) {
        Ok(output) => output,
        Err(error) => {
            print_error(error, &context);
            return Ok(false);
        }
    };

    let ok = output.is_ok();
    for error in output.errors.iter().cloned() {
        print_error(error, &context);
    }
    print_tree(&output.into_tree(), format).map_err(stdout_error)?;
    Ok(ok)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Compiles a grammar file, printing its diagnostics. `None` if it has errors.
fn load_grammar(path: &Path) -> Result<Option<Grammar>, StlrError> {
    let context = read_source(path)?;
    match compile(&context) {
        Ok(grammar) => {
            for warning in grammar.warnings() {
                print_error(warning.clone(), &context);
            }
            Ok(Some(grammar))
        }
        Err(errors) => {
            for error in errors {
                print_error(error, &context);
            }
            Ok(None)
        }
    }
}

fn read_source(path: &Path) -> Result<SourceContext, StlrError> {
    let name = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|error| StlrError::io(error, &name))?;
    Ok(SourceContext::from_file(name, text))
}

/// The path itself, or every `.stlr` file below it in name order.
fn grammar_files(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "stlr"))
        .map(|entry| entry.into_path())
        .collect()
}

fn stdout_error(error: std::io::Error) -> StlrError {
    StlrError::io(error, "<stdout>")
}
