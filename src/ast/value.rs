use std::fmt;

use im::OrdMap;

use crate::archive::Relocation;
use crate::ast::Node;
use crate::intrinsics::IntrinsicUnit;
use crate::types::TypeInfo;

/// An attribute value. Only `Node` values are visited by transforms;
/// everything else is opaque data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Node(Node),
    Int(i64),
    Str(String),
    Bool(bool),
    Type(TypeInfo),
    Bytes(Vec<u8>),
    Relocations(Vec<Relocation>),
    Table(OrdMap<String, Value>),
    Unit(&'static IntrinsicUnit),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Node(_) => "node",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Type(_) => "type",
            Value::Bytes(_) => "bytes",
            Value::Relocations(_) => "relocations",
            Value::Table(_) => "table",
            Value::Unit(_) => "unit",
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeInfo> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_relocations(&self) -> Option<&[Relocation]> {
        match self {
            Value::Relocations(relocs) => Some(relocs),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&OrdMap<String, Value>> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_unit(&self) -> Option<&'static IntrinsicUnit> {
        match self {
            Value::Unit(unit) => Some(unit),
            _ => None,
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<TypeInfo> for Value {
    fn from(ty: TypeInfo) -> Self {
        Value::Type(ty)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Relocation>> for Value {
    fn from(relocs: Vec<Relocation>) -> Self {
        Value::Relocations(relocs)
    }
}

impl From<OrdMap<String, Value>> for Value {
    fn from(table: OrdMap<String, Value>) -> Self {
        Value::Table(table)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Node(node) => write!(f, "{}", node),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Type(ty) => write!(f, "<{}>", ty),
            Value::Bytes(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                write!(f, "#[{}]", hex.join(" "))
            }
            Value::Relocations(relocs) => {
                let items: Vec<String> = relocs.iter().map(|r| r.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Table(table) => {
                let items: Vec<String> = table.keys().cloned().collect();
                write!(f, "{{{}}}", items.join(" "))
            }
            Value::Unit(unit) => write!(f, "<unit {}>", unit.name),
        }
    }
}
