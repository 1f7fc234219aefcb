//! Lays archives out in memory and patches their relocations.
//!
//! Zero-page symbols are given addresses from `zp_origin` upwards and are
//! not part of the image. Everything else is placed contiguously from
//! `origin`: the entry symbol first, then `text`, `data` and `bss`.

use std::collections::BTreeMap;

use crate::archive::{Archive, RelocationKind, Section, Symbol};
use crate::config::LinkOptions;
use crate::errors::{CompileError, Result};

/// A linked memory image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub origin: u16,
    pub bytes: Vec<u8>,
    /// Address of every symbol, zero-page ones included.
    pub symbols: BTreeMap<String, u16>,
}

impl Image {
    /// The bytes to write to disk, optionally prefixed with the load
    /// address.
    pub fn to_bytes(&self, header: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 2);
        if header {
            out.extend(self.origin.to_le_bytes());
        }
        out.extend(&self.bytes);
        out
    }

    /// `address name` lines sorted by address.
    pub fn map(&self) -> String {
        let mut entries: Vec<(&u16, &String)> = self.symbols.iter().map(|(n, a)| (a, n)).collect();
        entries.sort();
        entries
            .into_iter()
            .map(|(address, name)| format!("{:04x} {}\n", address, name))
            .collect()
    }
}

struct Placed<'a> {
    name: &'a str,
    symbol: &'a Symbol,
    offset: usize,
}

pub fn link(archives: &[Archive], options: &LinkOptions) -> Result<Image> {
    let mut defined: BTreeMap<&str, (&str, &Symbol)> = BTreeMap::new();
    let mut ordered: Vec<(&str, &Symbol)> = Vec::new();
    for archive in archives {
        for (name, symbol) in &archive.symbols {
            if let Some((unit, _)) = defined.insert(name.as_str(), (archive.unit.as_str(), symbol)) {
                return Err(CompileError::link(format!(
                    "symbol `{}` is defined by both `{}` and `{}`",
                    name, unit, archive.unit
                )));
            }
            ordered.push((name.as_str(), symbol));
        }
    }

    let mut addresses: BTreeMap<String, u16> = BTreeMap::new();

    let mut zp = options.zp_origin as usize;
    for (name, symbol) in ordered.iter().filter(|(_, s)| s.section == Section::Zp) {
        if symbol.data.iter().any(|b| *b != 0) {
            return Err(CompileError::link(format!(
                "zero-page symbol `{}` cannot have an initial value",
                name
            )));
        }
        if zp + symbol.data.len() > 0x100 {
            return Err(CompileError::link(format!(
                "zero page overflow while placing `{}`",
                name
            )));
        }
        addresses.insert(name.to_string(), zp as u16);
        zp += symbol.data.len();
    }

    let entry = match &options.entry {
        Some(entry) => match defined.get(entry.as_str()) {
            Some((_, symbol)) if symbol.section != Section::Zp => Some(entry.as_str()),
            Some(_) => {
                return Err(CompileError::link(format!(
                    "entry symbol `{}` is in the zero page",
                    entry
                )))
            }
            None => {
                return Err(CompileError::link(format!("entry symbol `{}` is not defined", entry)))
            }
        },
        None => None,
    };

    let mut placed: Vec<Placed> = Vec::new();
    let mut offset = 0;
    let mut layout: Vec<(&str, &Symbol)> = Vec::new();
    if let Some(entry) = entry {
        if let Some((_, symbol)) = defined.get(entry) {
            layout.push((entry, *symbol));
        }
    }
    for section in [Section::Text, Section::Data, Section::Bss] {
        layout.extend(
            ordered
                .iter()
                .filter(|(name, s)| s.section == section && Some(*name) != entry)
                .copied(),
        );
    }
    for (name, symbol) in layout {
        let address = options.origin as usize + offset;
        if address + symbol.data.len() > 0x10000 {
            return Err(CompileError::link(format!(
                "`{}` does not fit below $ffff",
                name
            )));
        }
        addresses.insert(name.to_string(), address as u16);
        placed.push(Placed { name, symbol, offset });
        offset += symbol.data.len();
    }

    let mut bytes = vec![0; offset];
    for item in &placed {
        let mut data = item.symbol.data.clone();
        for reloc in &item.symbol.relocations {
            let target = *addresses.get(&reloc.symbol).ok_or_else(|| {
                CompileError::link(format!(
                    "`{}` refers to undefined symbol `{}`",
                    item.name, reloc.symbol
                ))
            })?;
            let end = reloc.offset + reloc.kind.size();
            let Some(hole) = data.get_mut(reloc.offset..end) else {
                return Err(CompileError::link(format!(
                    "relocation at +{} lies outside `{}`",
                    reloc.offset, item.name
                )));
            };
            match reloc.kind {
                RelocationKind::Absolute16 => hole.copy_from_slice(&target.to_le_bytes()),
                RelocationKind::ZeroPage8 => {
                    if target > 0xff {
                        return Err(CompileError::link(format!(
                            "`{}` is not in the zero page",
                            reloc.symbol
                        )));
                    }
                    hole[0] = target as u8;
                }
            }
        }
        bytes[item.offset..item.offset + data.len()].copy_from_slice(&data);
    }

    tracing::info!(
        archives = archives.len(),
        symbols = addresses.len(),
        size = bytes.len(),
        "linked image"
    );
    Ok(Image {
        origin: options.origin,
        bytes,
        symbols: addresses,
    })
}
