//! Compiler and linker settings.
//!
//! Every field has a default, so a configuration file only names what it
//! changes:
//!
//! ```yaml
//! compile:
//!   schedule:
//!     deterministic: false
//!     seed: 7
//! link:
//!   origin: 0x0801
//!   entry: demo.main
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CompileError, Result};
use crate::passes::ScheduleOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compile: CompileOptions,
    pub link: LinkOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub schedule: ScheduleOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkOptions {
    /// Load address of the first byte of the image.
    pub origin: u16,
    /// First zero-page address handed to `zp` symbols.
    pub zp_origin: u8,
    /// Symbol placed at `origin`, before everything else.
    pub entry: Option<String>,
    /// Prefix the image with its little-endian load address (PRG layout).
    pub header: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            origin: 0x0800,
            zp_origin: 0x02,
            entry: None,
            header: false,
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| CompileError::config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CompileError::config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text)
            .map_err(|e| CompileError::config(format!("{}: {}", path.display(), e)))
    }

    /// The file's settings, or the defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
