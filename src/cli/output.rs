//! User-facing output of the CLI: trees, pass traces, archives and maps.

use std::io::{self, Write};

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::archive::Archive;
use crate::engine::Snapshot;
use crate::passes::Pass;

/// Colour only when stdout is a terminal.
pub fn color_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn heading(stdout: &mut StandardStream, text: &str) -> io::Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
    writeln!(stdout, "{}", text)?;
    stdout.reset()
}

/// Prints the first snapshot in full and every later one as a line diff
/// against its predecessor.
pub fn print_trace(snapshots: &[Snapshot]) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice());
    let mut previous: Option<String> = None;

    for (i, snapshot) in snapshots.iter().enumerate() {
        heading(&mut stdout, &format!("--- step {}: {} ---", i, snapshot.step))?;
        let current = snapshot.tree.to_string();
        match &previous {
            None => writeln!(stdout, "{}", current)?,
            Some(previous) if *previous == current => writeln!(stdout, "(unchanged)")?,
            Some(previous) => {
                let changeset = Changeset::new(previous, &current, "\n");
                print_diff(&mut stdout, &changeset.diffs)?;
            }
        }
        writeln!(stdout)?;
        previous = Some(current);
    }
    Ok(())
}

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) -> io::Result<()> {
    for diff in diffs {
        let (prefix, color, text) = match diff {
            Difference::Same(text) => (' ', None, text),
            Difference::Add(text) => ('+', Some(Color::Green), text),
            Difference::Rem(text) => ('-', Some(Color::Red), text),
        };
        stdout.set_color(ColorSpec::new().set_fg(color))?;
        for line in text.lines() {
            writeln!(stdout, "{}{}", prefix, line)?;
        }
    }
    stdout.reset()
}

pub fn print_passes(passes: &[Box<dyn Pass>]) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice());
    for (i, pass) in passes.iter().enumerate() {
        let info = pass.info();
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        write!(stdout, "{:>2}. {:<20}", i + 1, info.name)?;
        stdout.reset()?;
        writeln!(
            stdout,
            " introduces [{}]  uses [{}]  deletes [{}]",
            info.introduces.join(", "),
            info.uses.join(", "),
            info.deletes.join(", ")
        )?;
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_archive(archive: &Archive) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice());
    heading(&mut stdout, &format!("unit {}", archive.unit))?;
    writeln!(stdout, "source sha256 {}", archive.source_digest)?;

    for (name, symbol) in &archive.symbols {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(stdout, "{}", name)?;
        stdout.reset()?;
        writeln!(
            stdout,
            "  [{}] {} byte(s) : {}",
            symbol.section,
            symbol.data.len(),
            symbol.type_info
        )?;
        if !symbol.data.is_empty() {
            writeln!(stdout, "    {}", hex(&symbol.data))?;
        }
        for reloc in &symbol.relocations {
            writeln!(stdout, "    reloc {}", reloc)?;
        }
    }
    for (name, constant) in &archive.constants {
        writeln!(
            stdout,
            "constant {} = {} : {}",
            name, constant.value, constant.type_info
        )?;
    }
    Ok(())
}
