//! The `lodestar` command-line interface.
//!
//! Every subcommand is a thin wrapper over [`crate::engine`] and
//! [`crate::linker`]; errors are rendered with miette and turn into a
//! non-zero exit status.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use crate::archive::Archive;
use crate::cli::args::{Command, LodestarArgs, LogLevel, ScheduleArgs};
use crate::config::{CompileOptions, Config, LinkOptions};
use crate::engine;
use crate::errors::{print_error, CompileError, Result, SourceContext};
use crate::linker;
use crate::passes::simplify::simplify;

pub mod args;
pub mod output;

/// Extension of archive files written by `compile`.
pub const ARCHIVE_EXTENSION: &str = "json";

/// The main entry point for the CLI.
pub fn run() {
    let args = LodestarArgs::parse();
    init_logging(args.log_level);

    let config = Config::load_or_default(args.config.as_deref()).unwrap_or_else(|e| {
        print_error(e);
        process::exit(2);
    });

    let result = match args.command {
        Command::Compile {
            path,
            out_dir,
            schedule,
        } => handle_compile(&path, out_dir.as_deref(), &compile_options(&config, &schedule)),
        Command::Ast { file, simplify } => handle_ast(&file, simplify),
        Command::Trace { file, schedule } => {
            handle_trace(&file, &compile_options(&config, &schedule))
        }
        Command::Passes { schedule } => handle_passes(&compile_options(&config, &schedule)),
        Command::Dump { archive } => handle_dump(&archive),
        Command::Link {
            archives,
            output,
            entry,
            origin,
            header,
            map,
        } => {
            let mut options = config.link.clone();
            if entry.is_some() {
                options.entry = entry;
            }
            if let Some(origin) = origin {
                options.origin = origin;
            }
            options.header |= header;
            handle_link(&archives, &output, &options, map)
        }
    };

    if let Err(e) = result {
        print_error(e);
        process::exit(1);
    }
}

fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// File settings with the command-line schedule flags applied on top.
fn compile_options(config: &Config, schedule: &ScheduleArgs) -> CompileOptions {
    let mut options = config.compile.clone();
    if schedule.shuffle {
        options.schedule.deterministic = false;
    }
    if schedule.seed.is_some() {
        options.schedule.seed = schedule.seed;
    }
    options
}

fn read_source(path: &Path) -> Result<(String, SourceContext)> {
    let text = fs::read_to_string(path)
        .map_err(|e| CompileError::io(format!("{}: {}", path.display(), e)))?;
    let source = SourceContext::from_file(path.display().to_string(), text.as_str());
    Ok((text, source))
}

fn archive_path(source: &Path, out_dir: Option<&Path>) -> Result<PathBuf> {
    let unit = engine::unit_name(source)?;
    let dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{}.{}", unit, ARCHIVE_EXTENSION)))
}

/// Compiles every source found; each failure is reported and the first
/// one is returned once all files were tried.
fn handle_compile(path: &Path, out_dir: Option<&Path>, options: &CompileOptions) -> Result<()> {
    let sources = engine::discover_sources(path)?;
    if sources.is_empty() {
        return Err(CompileError::io(format!(
            "no .{} files under {}",
            engine::SOURCE_EXTENSION,
            path.display()
        )));
    }
    if let Some(dir) = out_dir {
        fs::create_dir_all(dir)
            .map_err(|e| CompileError::io(format!("{}: {}", dir.display(), e)))?;
    }

    let mut failures = Vec::new();
    for source in &sources {
        let compiled = engine::compile_file(source, options).and_then(|archive| {
            let target = archive_path(source, out_dir)?;
            archive.write(&target)?;
            Ok(target)
        });
        match compiled {
            Ok(target) => println!("{} -> {}", source.display(), target.display()),
            Err(e) => failures.push(e),
        }
    }

    let count = failures.len();
    let mut failures = failures.into_iter();
    let Some(first) = failures.next() else {
        return Ok(());
    };
    for later in failures {
        print_error(later);
    }
    if count > 1 {
        eprintln!("{} of {} files failed to compile", count, sources.len());
    }
    Err(first)
}

fn handle_ast(path: &Path, simplified: bool) -> Result<()> {
    let (text, source) = read_source(path)?;
    let tree = engine::parse_source(&text)
        .and_then(|tree| if simplified { simplify(&tree) } else { Ok(tree) })
        .map_err(|e| e.with_source(&source))?;
    println!("{}", tree);
    Ok(())
}

fn handle_trace(path: &Path, options: &CompileOptions) -> Result<()> {
    let (text, source) = read_source(path)?;
    let unit = engine::unit_name(path)?;
    let snapshots =
        engine::trace_source(&text, &unit, options).map_err(|e| e.with_source(&source))?;
    output::print_trace(&snapshots)?;
    Ok(())
}

fn handle_passes(options: &CompileOptions) -> Result<()> {
    let passes = engine::scheduled_passes(options)?;
    output::print_passes(&passes)?;
    Ok(())
}

fn handle_dump(path: &Path) -> Result<()> {
    let archive = Archive::read(path)?;
    output::print_archive(&archive)?;
    Ok(())
}

fn handle_link(
    paths: &[PathBuf],
    output_path: &Path,
    options: &LinkOptions,
    map: bool,
) -> Result<()> {
    let archives = paths
        .iter()
        .map(|path| Archive::read(path))
        .collect::<Result<Vec<_>>>()?;
    let image = linker::link(&archives, options)?;
    fs::write(output_path, image.to_bytes(options.header))
        .map_err(|e| CompileError::io(format!("{}: {}", output_path.display(), e)))?;
    if map {
        print!("{}", image.map());
    }
    println!(
        "{} byte(s) at ${:04x} -> {}",
        image.bytes.len(),
        image.origin,
        output_path.display()
    );
    Ok(())
}
