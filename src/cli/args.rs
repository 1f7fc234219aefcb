//! Command-line arguments and subcommands of the `lodestar` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "lodestar",
    version,
    about = "Compiler and linker for the lode language, targeting 6502-class CPUs."
)]
pub struct LodestarArgs {
    /// YAML configuration file; command-line flags override its values.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Most verbose log level written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Pass ordering flags shared by the commands that run passes.
#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// Visit independent passes in a shuffled order.
    #[arg(long)]
    pub shuffle: bool,

    /// Seed for `--shuffle`.
    #[arg(long, requires = "shuffle")]
    pub seed: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile a source file, or every `.lode` file under a directory, into archives.
    Compile {
        #[arg(required = true)]
        path: PathBuf,

        /// Directory for the archives; defaults to next to each source.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// Print the syntax tree of a source file.
    Ast {
        #[arg(required = true)]
        file: PathBuf,

        /// Print the tree after simplification.
        #[arg(long)]
        simplify: bool,
    },
    /// Show the tree after every pass as a coloured diff.
    Trace {
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// List the compiler passes in scheduled order.
    Passes {
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// Print the contents of an archive.
    Dump {
        #[arg(required = true)]
        archive: PathBuf,
    },
    /// Link archives into a memory image.
    Link {
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// Symbol placed first in the image.
        #[arg(long)]
        entry: Option<String>,

        /// Load address, decimal or `0x`/`$` hex.
        #[arg(long, value_parser = parse_address)]
        origin: Option<u16>,

        /// Prefix the image with its load address.
        #[arg(long)]
        header: bool,

        /// Print the symbol map.
        #[arg(long)]
        map: bool,
    },
}

fn parse_address(text: &str) -> Result<u16, String> {
    let (digits, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    u16::from_str_radix(digits, radix).map_err(|e| format!("invalid address `{}`: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_accept_hex_prefixes() {
        assert_eq!(parse_address("0x0801"), Ok(0x0801));
        assert_eq!(parse_address("$c000"), Ok(0xc000));
        assert_eq!(parse_address("2049"), Ok(2049));
        assert!(parse_address("0x10000").is_err());
    }

    #[test]
    fn arguments_are_well_formed() {
        use clap::CommandFactory;
        LodestarArgs::command().debug_assert();
    }
}
