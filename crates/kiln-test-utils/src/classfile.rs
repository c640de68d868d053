use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// A method to emit.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Annotation type descriptors, e.g. `Lorg/junit/Test;`.
    pub annotations: Vec<String>,
    /// A string-valued element added to the first annotation, to exercise
    /// element skipping.
    pub string_element: Option<(String, String)>,
}

impl MethodSpec {
    pub fn public(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: "()V".to_string(),
            access_flags: ACC_PUBLIC,
            annotations: Vec::new(),
            string_element: None,
        }
    }

    pub fn private(name: &str) -> Self {
        Self {
            access_flags: 0,
            ..Self::public(name)
        }
    }

    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn with_string_element(mut self, name: &str, value: &str) -> Self {
        self.string_element = Some((name.to_string(), value.to_string()));
        self
    }
}

/// Builds a class file with only the structures test discovery reads.
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    internal_name: String,
    super_class: Option<String>,
    access_flags: u16,
    methods: Vec<MethodSpec>,
}

impl ClassFileBuilder {
    /// `internal_name` uses slashes: `com/acme/FooTest`.
    pub fn new(internal_name: &str) -> Self {
        Self {
            internal_name: internal_name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            access_flags: ACC_PUBLIC,
            methods: Vec::new(),
        }
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_class = Some(internal_name.to_string());
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_class = pool.class(&self.internal_name);
        let super_class = self.super_class.as_deref().map(|s| pool.class(s)).unwrap_or(0);

        let mut methods = Vec::new();
        u2(&mut methods, self.methods.len() as u16);
        for method in &self.methods {
            u2(&mut methods, method.access_flags);
            u2(&mut methods, pool.utf8(&method.name));
            u2(&mut methods, pool.utf8(&method.descriptor));
            if method.annotations.is_empty() {
                u2(&mut methods, 0);
                continue;
            }

            let mut body = Vec::new();
            u2(&mut body, method.annotations.len() as u16);
            for (i, annotation) in method.annotations.iter().enumerate() {
                u2(&mut body, pool.utf8(annotation));
                match (&method.string_element, i) {
                    (Some((name, value)), 0) => {
                        u2(&mut body, 1);
                        u2(&mut body, pool.utf8(name));
                        body.push(b's');
                        u2(&mut body, pool.utf8(value));
                    }
                    _ => u2(&mut body, 0),
                }
            }

            u2(&mut methods, 1);
            u2(&mut methods, pool.utf8("RuntimeVisibleAnnotations"));
            u4(&mut methods, body.len() as u32);
            methods.extend_from_slice(&body);
        }

        let mut out = Vec::new();
        u4(&mut out, 0xCAFE_BABE);
        u2(&mut out, 0);
        u2(&mut out, 52);
        u2(&mut out, pool.count());
        out.extend_from_slice(&pool.bytes);
        u2(&mut out, self.access_flags);
        u2(&mut out, this_class);
        u2(&mut out, super_class);
        u2(&mut out, 0); // interfaces
        u2(&mut out, 0); // fields
        out.extend_from_slice(&methods);
        u2(&mut out, 0); // class attributes
        out
    }

    /// Write the class under `root` at `<internal_name>.class`.
    pub fn write_to(&self, root: &Path) -> PathBuf {
        let path = root.join(format!("{}.class", self.internal_name));
        crate::write_file(&path, self.build());
        path
    }
}

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn count(&self) -> u16 {
        self.next + 1
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8.get(value) {
            return index;
        }
        self.next += 1;
        let index = self.next;
        self.bytes.push(1);
        u2(&mut self.bytes, value.len() as u16);
        self.bytes.extend_from_slice(value.as_bytes());
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        if let Some(&index) = self.classes.get(internal_name) {
            return index;
        }
        let name_index = self.utf8(internal_name);
        self.next += 1;
        let index = self.next;
        self.bytes.push(7);
        u2(&mut self.bytes, name_index);
        self.classes.insert(internal_name.to_string(), index);
        index
    }
}

fn u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
