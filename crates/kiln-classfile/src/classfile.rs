use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::reader::Reader;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// Annotation types that mark a method as a test.
pub const TEST_ANNOTATIONS: &[&str] = &[
    "Lorg/junit/Test;",
    "Lorg/junit/jupiter/api/Test;",
    "Lorg/junit/jupiter/params/ParameterizedTest;",
    "Lorg/junit/jupiter/api/RepeatedTest;",
    "Lorg/junit/jupiter/api/TestFactory;",
    "Lorg/testng/annotations/Test;",
];

/// The parts of a class file test discovery needs: flags, hierarchy and
/// methods with their runtime-visible annotation types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `com/acme/FooTest`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub methods: Vec<MethodSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Type descriptors of the method's runtime-visible annotations.
    pub annotations: Vec<String>,
}

impl ClassSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::NotAClassFile { magic });
        }

        let _minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        reader.skip(interfaces_count * 2)?;

        let fields_count = reader.read_u2()? as usize;
        for _ in 0..fields_count {
            reader.skip(6)?;
            skip_attributes(&mut reader)?;
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_method(&mut reader, &cp)?);
        }

        skip_attributes(&mut reader)?;
        reader.ensure_empty()?;

        Ok(Self {
            major_version,
            access_flags,
            this_class,
            super_class,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// Binary name with dots, e.g. `com.acme.FooTest$Inner`.
    pub fn binary_name(&self) -> String {
        self.this_class.replace('/', ".")
    }

    /// Public methods carrying one of [`TEST_ANNOTATIONS`].
    pub fn test_methods(&self) -> impl Iterator<Item = &MethodSummary> {
        self.methods.iter().filter(|m| m.is_test())
    }
}

impl MethodSummary {
    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_test(&self) -> bool {
        self.is_public()
            && self
                .annotations
                .iter()
                .any(|a| TEST_ANNOTATIONS.contains(&a.as_str()))
    }
}

fn parse_method(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<MethodSummary> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut annotations = Vec::new();
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info_offset = reader.offset();
        let info = reader.read_bytes(length)?;
        if cp.get_utf8(name_index)? != "RuntimeVisibleAnnotations" {
            continue;
        }

        let mut sub = Reader::at(info, info_offset);
        let num = sub.read_u2()? as usize;
        for _ in 0..num {
            annotations.push(read_annotation(&mut sub, cp)?);
        }
        sub.ensure_empty()?;
    }

    Ok(MethodSummary {
        access_flags,
        name,
        descriptor,
        annotations,
    })
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<()> {
    let count = reader.read_u2()? as usize;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

/// Returns the annotation's type descriptor; element values are skipped.
fn read_annotation(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<String> {
    let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
    let pairs = reader.read_u2()? as usize;
    for _ in 0..pairs {
        reader.skip(2)?;
        skip_element_value(reader, cp)?;
    }
    Ok(type_descriptor)
}

fn skip_element_value(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<()> {
    let offset = reader.offset();
    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => read_annotation(reader, cp).map(|_| ()),
        b'[' => {
            let count = reader.read_u2()? as usize;
            for _ in 0..count {
                skip_element_value(reader, cp)?;
            }
            Ok(())
        }
        tag => Err(Error::BadElementValue { tag, offset }),
    }
}
