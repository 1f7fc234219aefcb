use std::fmt;

/// Node tags: the parser's raw shapes plus those introduced by passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    // Raw tree
    Unit,
    Items,
    Use,
    Constant,
    Let,
    Fun,
    Params,
    Param,
    Stmts,
    Set,
    Return,
    Call,
    Args,
    Member,
    Binop,
    Neg,
    Deref,
    Paren,
    Number,
    Str,
    Ident,
    TypeName,
    TypeRef,

    // Semantic annotations
    TypeInfo,
    Scope,
    Binding,
    Intrinsic,
    AbsoluteStorage,
    ImmediateStorage,
    Returned,

    // Machine level
    Load,
    Store,
    Arith,
    Jump,
    Rts,
    Code,
    DataSymbol,
    FunSymbol,
}

impl Tag {
    pub const fn name(&self) -> &'static str {
        match self {
            Tag::Unit => "unit",
            Tag::Items => "items",
            Tag::Use => "use",
            Tag::Constant => "constant",
            Tag::Let => "let",
            Tag::Fun => "fun",
            Tag::Params => "params",
            Tag::Param => "param",
            Tag::Stmts => "stmts",
            Tag::Set => "set",
            Tag::Return => "return",
            Tag::Call => "call",
            Tag::Args => "args",
            Tag::Member => "member",
            Tag::Binop => "binop",
            Tag::Neg => "neg",
            Tag::Deref => "deref",
            Tag::Paren => "paren",
            Tag::Number => "number",
            Tag::Str => "string",
            Tag::Ident => "ident",
            Tag::TypeName => "type_name",
            Tag::TypeRef => "type_ref",
            Tag::TypeInfo => "type_info",
            Tag::Scope => "scope",
            Tag::Binding => "binding",
            Tag::Intrinsic => "intrinsic",
            Tag::AbsoluteStorage => "absolute_storage",
            Tag::ImmediateStorage => "immediate_storage",
            Tag::Returned => "returned",
            Tag::Load => "load",
            Tag::Store => "store",
            Tag::Arith => "arith",
            Tag::Jump => "jump",
            Tag::Rts => "rts",
            Tag::Code => "code",
            Tag::DataSymbol => "data_symbol",
            Tag::FunSymbol => "fun_symbol",
        }
    }

    /// The element attribute of a sequence tag; the remainder of a sequence
    /// always lives under `next`.
    pub const fn sequence_element(&self) -> Option<&'static str> {
        match self {
            Tag::Items => Some("item"),
            Tag::Params => Some("param"),
            Tag::Stmts => Some("stmt"),
            Tag::Args => Some("arg"),
            _ => None,
        }
    }

    pub const fn is_sequence(&self) -> bool {
        self.sequence_element().is_some()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
