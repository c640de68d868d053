use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Why [`ClassSummary::parse`](crate::ClassSummary::parse) rejected its
/// input. Offsets are byte positions in the whole class file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("not a class file (starts with 0x{magic:08x})")]
    NotAClassFile { magic: u32 },
    #[error("class file is truncated: {needed} more bytes needed at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("unknown constant pool tag {tag} at offset {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },
    #[error("constant pool has no usable entry #{index}")]
    BadConstantIndex { index: u16 },
    #[error("constant pool entry #{index} is {found}, expected {expected}")]
    WrongConstantKind {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("constant pool entry #{index} is not valid modified UTF-8")]
    BadUtf8 { index: u16 },
    #[error("unknown annotation element tag {tag:#04x} at offset {offset}")]
    BadElementValue { tag: u8, offset: usize },
    #[error("{len} unexpected bytes after offset {offset}")]
    TrailingBytes { offset: usize, len: usize },
}
