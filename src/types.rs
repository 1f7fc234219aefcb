//! Type descriptors shared by the passes and the archive format.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{CompileError, Result};

/// A value type of the language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeInfo {
    /// An integer of 1 to 4 bytes.
    Int { width: u8, signed: bool },
    /// A 16-bit address of a value of the inner type.
    Ref(Box<TypeInfo>),
    Function {
        ret: Box<TypeInfo>,
        args: Vec<TypeInfo>,
    },
    Void,
    /// A compile-time-only type with no storage.
    Phantom(String),
}

impl TypeInfo {
    pub const U8: TypeInfo = TypeInfo::Int {
        width: 1,
        signed: false,
    };
    pub const U16: TypeInfo = TypeInfo::Int {
        width: 2,
        signed: false,
    };

    pub fn int(width: u8, signed: bool) -> Self {
        TypeInfo::Int { width, signed }
    }

    pub fn reference(target: TypeInfo) -> Self {
        TypeInfo::Ref(Box::new(target))
    }

    pub fn function(ret: TypeInfo, args: Vec<TypeInfo>) -> Self {
        TypeInfo::Function {
            ret: Box::new(ret),
            args,
        }
    }

    /// Looks up a primitive type by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        let (signed, bits) = if let Some(bits) = name.strip_prefix('u') {
            (false, bits)
        } else if let Some(bits) = name.strip_prefix('i') {
            (true, bits)
        } else {
            return (name == "void").then_some(TypeInfo::Void);
        };
        match bits {
            "8" => Some(Self::int(1, signed)),
            "16" => Some(Self::int(2, signed)),
            "24" => Some(Self::int(3, signed)),
            "32" => Some(Self::int(4, signed)),
            _ => None,
        }
    }

    /// Storage size in bytes.
    pub fn width(&self) -> usize {
        match self {
            TypeInfo::Int { width, .. } => *width as usize,
            TypeInfo::Ref(_) | TypeInfo::Function { .. } => 2,
            TypeInfo::Void | TypeInfo::Phantom(_) => 0,
        }
    }

    /// The referent of a reference type.
    pub fn target(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Ref(target) => Some(target),
            _ => None,
        }
    }

    /// Whether an integer literal `value` is representable in this type.
    /// References accept any 16-bit address.
    pub fn fits(&self, value: i64) -> bool {
        match self {
            TypeInfo::Int { width, signed } => {
                let bits = u32::from(*width) * 8;
                if *signed {
                    let bound = 1i64 << (bits - 1);
                    (-bound..bound).contains(&value)
                } else {
                    (0..(1i64 << bits)).contains(&value)
                }
            }
            TypeInfo::Ref(_) => (0..=0xffff).contains(&value),
            _ => false,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// expected. Integers widen within the same signedness.
    pub fn can_assign_from(&self, other: &TypeInfo) -> bool {
        match (self, other) {
            (
                TypeInfo::Int { width, signed },
                TypeInfo::Int {
                    width: other_width,
                    signed: other_signed,
                },
            ) => signed == other_signed && width >= other_width,
            _ => self == other,
        }
    }

    /// The smallest integer type holding `value`.
    pub fn for_literal(value: i64) -> Self {
        let signed = value < 0;
        (1..=4)
            .map(|width| Self::int(width, signed))
            .find(|ty| ty.fits(value))
            .unwrap_or(Self::int(4, signed))
    }

    // ------------------------------------------------------------------------
    // Binary encoding
    // ------------------------------------------------------------------------

    /// Compact binary form used in archives. Argument lists and phantom
    /// names longer than 255 cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            TypeInfo::Int { width, signed } => {
                out.push(0x01);
                out.push(width | if *signed { 0x80 } else { 0 });
            }
            TypeInfo::Ref(target) => {
                out.push(0x02);
                target.encode_into(out)?;
            }
            TypeInfo::Function { ret, args } => {
                out.push(0x03);
                ret.encode_into(out)?;
                out.push(length_byte(args.len(), "function arguments")?);
                for arg in args {
                    arg.encode_into(out)?;
                }
            }
            TypeInfo::Void => out.push(0x04),
            TypeInfo::Phantom(name) => {
                out.push(0x05);
                out.push(length_byte(name.len(), "phantom type name")?);
                out.extend_from_slice(name.as_bytes());
            }
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        let ty = Self::decode_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(CompileError::io(format!(
                "{} trailing bytes after type descriptor",
                cursor.len()
            )));
        }
        Ok(ty)
    }

    fn decode_from(cursor: &mut &[u8]) -> Result<Self> {
        let tag = take_byte(cursor)?;
        match tag {
            0x01 => {
                let byte = take_byte(cursor)?;
                let width = byte & 0x7f;
                if !(1..=4).contains(&width) {
                    return Err(CompileError::io(format!("invalid integer width {}", width)));
                }
                Ok(TypeInfo::int(width, byte & 0x80 != 0))
            }
            0x02 => Ok(TypeInfo::reference(Self::decode_from(cursor)?)),
            0x03 => {
                let ret = Self::decode_from(cursor)?;
                let count = take_byte(cursor)?;
                let args = (0..count)
                    .map(|_| Self::decode_from(cursor))
                    .collect::<Result<Vec<_>>>()?;
                Ok(TypeInfo::function(ret, args))
            }
            0x04 => Ok(TypeInfo::Void),
            0x05 => {
                let len = take_byte(cursor)? as usize;
                if cursor.len() < len {
                    return Err(CompileError::io("truncated phantom type name"));
                }
                let (name, rest) = cursor.split_at(len);
                *cursor = rest;
                let name = String::from_utf8(name.to_vec())
                    .map_err(|e| CompileError::io(format!("phantom type name: {}", e)))?;
                Ok(TypeInfo::Phantom(name))
            }
            other => Err(CompileError::io(format!(
                "unknown type descriptor tag {:#04x}",
                other
            ))),
        }
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(self.encode()?.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let digits = text.as_bytes();
        if digits.len() % 2 != 0 {
            return Err(CompileError::io("odd-length type descriptor"));
        }
        let bytes = digits
            .chunks(2)
            .map(|pair| Ok(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?))
            .collect::<Result<Vec<u8>>>()?;
        Self::decode(&bytes)
    }
}

fn hex_digit(byte: u8) -> Result<u8> {
    char::from(byte)
        .to_digit(16)
        .map(|digit| digit as u8)
        .ok_or_else(|| CompileError::io(format!("type descriptor: invalid hex byte {:#04x}", byte)))
}

fn length_byte(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len).map_err(|_| CompileError::io(format!("too many {} to encode: {}", what, len)))
}

fn take_byte(cursor: &mut &[u8]) -> Result<u8> {
    let (&first, rest) = cursor
        .split_first()
        .ok_or_else(|| CompileError::io("truncated type descriptor"))?;
    *cursor = rest;
    Ok(first)
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInfo::Int { width, signed } => {
                write!(f, "{}{}", if *signed { 'i' } else { 'u' }, *width as u32 * 8)
            }
            TypeInfo::Ref(target) => write!(f, "&{}", target),
            TypeInfo::Function { ret, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "fun({}) -> {}", args.join(", "), ret)
            }
            TypeInfo::Void => write!(f, "void"),
            TypeInfo::Phantom(name) => write!(f, "phantom {}", name),
        }
    }
}

impl Serialize for TypeInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let hex = self.to_hex().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for TypeInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        TypeInfo::from_hex(&text).map_err(serde::de::Error::custom)
    }
}
