//! Relocatable object archives.
//!
//! One archive holds the compiled symbols and constants of one source
//! unit. On disk it is pretty-printed JSON; byte strings and type
//! descriptors are written as hex.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{CompileError, ErrorKind, Result};
use crate::types::TypeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Text,
    Data,
    Bss,
    /// Zero page.
    Zp,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Text => "text",
            Section::Data => "data",
            Section::Bss => "bss",
            Section::Zp => "zp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Section::Text),
            "data" => Some(Section::Data),
            "bss" => Some(Section::Bss),
            "zp" => Some(Section::Zp),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationKind {
    /// Little-endian 16-bit address.
    Absolute16,
    /// Low byte of a zero-page address.
    ZeroPage8,
}

impl RelocationKind {
    pub fn size(&self) -> usize {
        match self {
            RelocationKind::Absolute16 => 2,
            RelocationKind::ZeroPage8 => 1,
        }
    }
}

/// A hole at `offset` in a symbol's data to be patched with the address of
/// `symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relocation {
    pub offset: usize,
    pub symbol: String,
    pub kind: RelocationKind,
}

impl Relocation {
    pub fn new(offset: usize, symbol: impl Into<String>, kind: RelocationKind) -> Self {
        Self {
            offset,
            symbol: symbol.into(),
            kind,
        }
    }

    pub fn shifted(&self, by: usize) -> Self {
        Self {
            offset: self.offset + by,
            ..self.clone()
        }
    }
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} {:?} {}", self.offset, self.kind, self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub section: Section,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub type_info: TypeInfo,
    #[serde(default)]
    pub relocations: Vec<Relocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub type_info: TypeInfo,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub unit: String,
    pub source_digest: String,
    #[serde(default)]
    pub symbols: BTreeMap<String, Symbol>,
    #[serde(default)]
    pub constants: BTreeMap<String, Constant>,
}

impl Archive {
    pub fn new(unit: impl Into<String>, source: &str) -> Self {
        Self {
            unit: unit.into(),
            source_digest: Self::digest(source),
            symbols: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }

    /// SHA-256 of the source text, hex encoded.
    pub fn digest(source: &str) -> String {
        format!("{:x}", Sha256::digest(source.as_bytes()))
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, symbol: Symbol) -> Result<()> {
        let name = name.into();
        if self.symbols.contains_key(&name) {
            return Err(ErrorKind::DuplicateDefinition { name }.into());
        }
        self.symbols.insert(name, symbol);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CompileError::internal(format!("serializing archive: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CompileError::io(format!("invalid archive: {}", e)))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .map_err(|e| CompileError::io(format!("{}: {}", path.display(), e)))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CompileError::io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let text: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.len() % 2 != 0 {
            return Err(serde::de::Error::custom("odd-length hex string"));
        }
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_bytes_and_types() {
        let mut archive = Archive::new("demo", "fun main() endfun\n");
        archive
            .add_symbol(
                "demo.main",
                Symbol {
                    section: Section::Text,
                    data: vec![0x20, 0x00, 0x00, 0x60],
                    type_info: TypeInfo::function(TypeInfo::Void, vec![]),
                    relocations: vec![Relocation::new(1, "demo.f", RelocationKind::Absolute16)],
                },
            )
            .unwrap();
        let json = archive.to_json().unwrap();
        assert!(json.contains("\"20000060\""));
        assert_eq!(Archive::from_json(&json).unwrap(), archive);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let mut archive = Archive::new("demo", "");
        let symbol = Symbol {
            section: Section::Bss,
            data: vec![0],
            type_info: TypeInfo::U8,
            relocations: vec![],
        };
        archive.add_symbol("demo.x", symbol.clone()).unwrap();
        assert!(archive.add_symbol("demo.x", symbol).is_err());
    }
}
