//! User-facing output of the CLI: coloured trees, serialized trees and
//! grammar summaries.

use std::io::{self, IsTerminal, Write};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::source::Source;
use crate::stlr::Grammar;
use crate::tree::{Node, Tree, TreeNode};

use super::args::Format;

/// Colour only when stdout is a terminal.
fn color_choice() -> ColorChoice {
    if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

// ============================================================================
// TREES
// ============================================================================

/// Writes a parse tree to stdout in the requested format.
pub fn print_tree(tree: &Tree<Node>, format: Format) -> io::Result<()> {
    match format {
        Format::Tree => {
            let mut stdout = StandardStream::stdout(color_choice());
            for node in &tree.nodes {
                write_node(&mut stdout, node, &tree.source, 0)?;
            }
            Ok(())
        }
        Format::Json => {
            let json = serde_json::to_string_pretty(tree).map_err(io::Error::other)?;
            println!("{}", json);
            Ok(())
        }
        Format::Yaml => {
            let yaml = serde_yaml::to_string(tree).map_err(io::Error::other)?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

/// Writes one streamed node. Serialized formats get one document per node.
pub fn print_node(node: Node, source: &Source, format: Format) -> io::Result<()> {
    let tree = Tree::new(source.clone(), vec![node]);
    match format {
        Format::Json => {
            let json = serde_json::to_string(&tree).map_err(io::Error::other)?;
            println!("{}", json);
            Ok(())
        }
        Format::Yaml => {
            println!("---");
            print_tree(&tree, format)
        }
        Format::Tree => print_tree(&tree, format),
    }
}

fn write_node<W: WriteColor>(out: &mut W, node: &Node, source: &Source, depth: usize) -> io::Result<()> {
    write!(out, "{:indent$}", "", indent = depth * 2)?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    write!(out, "{}", node.token())?;
    out.reset()?;

    if node.children().is_empty() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, " {:?}", node.matched_string(source))?;
        out.reset()?;
    }

    let range = node.range();
    out.set_color(ColorSpec::new().set_dimmed(true))?;
    writeln!(out, " [{}..{}]", range.start, range.end)?;
    out.reset()?;

    for child in node.children() {
        write_node(out, child, source, depth + 1)?;
    }
    Ok(())
}

// ============================================================================
// GRAMMARS
// ============================================================================

/// Prints each declaration with its compiled form.
pub fn print_rules(grammar: &Grammar) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice());
    if let Some(name) = grammar.name() {
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(stdout, "grammar {}", name)?;
        stdout.reset()?;
    }

    let roots = grammar.roots();
    for (name, id) in grammar.definitions() {
        let rule = grammar.rules().get(id);
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        write!(stdout, "{}", name)?;
        stdout.reset()?;
        writeln!(stdout, " = {}", grammar.rules().display(id))?;

        stdout.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(stdout, "    produces {}", rule.produces)?;
        if roots.contains(&id) {
            write!(stdout, ", root")?;
        }
        writeln!(stdout)?;
        stdout.reset()?;
    }
    Ok(())
}

/// Prints a one-line success summary for a checked grammar.
pub fn print_checked(path: &str, grammar: &Grammar) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice());
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(stdout, "ok")?;
    stdout.reset()?;
    writeln!(
        stdout,
        " {} ({} declarations, {} warning(s))",
        path,
        grammar.definitions().count(),
        grammar.warnings().len()
    )
}
