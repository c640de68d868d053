use crate::error::{Error, Result};
use crate::reader::Reader;

/// Constant pool entries. Only the ones discovery reads keep their payload.
#[derive(Debug, Clone)]
pub(crate) enum CpInfo {
    Utf8(String),
    Class { name_index: u16 },
    Other(&'static str),
    /// Second slot of a `Long` or `Double`.
    Unusable,
}

impl CpInfo {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            CpInfo::Utf8(_) => "Utf8",
            CpInfo::Class { .. } => "Class",
            CpInfo::Other(kind) => kind,
            CpInfo::Unusable => "Unusable",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<CpInfo>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        // Index 0 is never valid.
        entries.push(CpInfo::Unusable);

        while entries.len() < count {
            let offset = reader.offset();
            let tag = reader.read_u1()?;
            let (info, wide) = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    let value = decode_modified_utf8(reader.read_bytes(len)?).ok_or(
                        Error::BadUtf8 {
                            index: entries.len() as u16,
                        },
                    )?;
                    (CpInfo::Utf8(value), false)
                }
                3 => (skip(reader, 4, "Integer")?, false),
                4 => (skip(reader, 4, "Float")?, false),
                5 => (skip(reader, 8, "Long")?, true),
                6 => (skip(reader, 8, "Double")?, true),
                7 => (
                    CpInfo::Class {
                        name_index: reader.read_u2()?,
                    },
                    false,
                ),
                8 => (skip(reader, 2, "String")?, false),
                9 => (skip(reader, 4, "Fieldref")?, false),
                10 => (skip(reader, 4, "Methodref")?, false),
                11 => (skip(reader, 4, "InterfaceMethodref")?, false),
                12 => (skip(reader, 4, "NameAndType")?, false),
                15 => (skip(reader, 3, "MethodHandle")?, false),
                16 => (skip(reader, 2, "MethodType")?, false),
                17 => (skip(reader, 4, "Dynamic")?, false),
                18 => (skip(reader, 4, "InvokeDynamic")?, false),
                19 => (skip(reader, 2, "Module")?, false),
                20 => (skip(reader, 2, "Package")?, false),
                tag => return Err(Error::UnknownConstantTag { tag, offset }),
            };
            entries.push(info);
            if wide {
                entries.push(CpInfo::Unusable);
            }
        }

        Ok(Self { entries })
    }

    pub(crate) fn get(&self, index: u16) -> Result<&CpInfo> {
        match self.entries.get(index as usize) {
            Some(CpInfo::Unusable) | None => Err(Error::BadConstantIndex { index }),
            Some(info) => Ok(info),
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            CpInfo::Utf8(value) => Ok(value),
            other => Err(Error::WrongConstantKind {
                index,
                expected: "Utf8",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::Class { name_index } => Ok(self.get_utf8(*name_index)?.to_string()),
            other => Err(Error::WrongConstantKind {
                index,
                expected: "Class",
                found: other.kind(),
            }),
        }
    }
}

fn skip(reader: &mut Reader<'_>, len: usize, kind: &'static str) -> Result<CpInfo> {
    reader.skip(len)?;
    Ok(CpInfo::Other(kind))
}

/// JVM "modified UTF-8": NUL is encoded as `C0 80` and supplementary
/// characters as two 3-byte surrogates.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_string());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        if b0 & 0x80 == 0 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1)? as u16;
            units.push(((b0 & 0x1F) << 6) | (b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1)? as u16;
            let b2 = *bytes.get(i + 2)? as u16;
            units.push(((b0 & 0x0F) << 12) | ((b1 & 0x3F) << 6) | (b2 & 0x3F));
            i += 3;
        } else {
            return None;
        }
    }
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .ok()
}
