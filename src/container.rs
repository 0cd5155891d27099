//! Container loading: zip enumeration and class file parsing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jclassfile::class_file::{self, ClassFlags};
use jclassfile::constant_pool::ConstantPool;
use jclassfile::fields::FieldFlags;
use jclassfile::methods::MethodFlags;
use zip::ZipArchive;

use crate::descriptor::{field_type_name, method_signature};
use crate::ir::{ClassDef, FieldDef, MethodDef, Module};
use crate::strings::{class_strings, method_strings, resolve_utf8};

/// Open zip container holding compiled bytecode modules.
///
/// The archive handle lives as long as the `Container` value and is released
/// when it is dropped, on every exit path.
pub struct Container {
    archive: ZipArchive<File>,
    entries: Vec<(usize, String)>,
}

impl Container {
    /// Open a container and enumerate its class entries. Fails if the
    /// archive itself cannot be read; individual entries are not parsed yet.
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive =
            ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

        let mut entries = Vec::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if name.ends_with(".class") && !name.ends_with("module-info.class") {
                entries.push((index, name));
            }
        }

        // Keep scan order deterministic regardless of archive layout.
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        Ok(Self { archive, entries })
    }

    /// Number of class entries the container will yield.
    pub fn module_count(&self) -> usize {
        self.entries.len()
    }

    /// Lazily parse modules in entry-name order. Entries that fail to parse
    /// as class files are skipped so one damaged entry cannot abort an
    /// otherwise healthy scan; a read failure of the archive itself still
    /// surfaces as an error.
    pub fn modules(&mut self) -> Modules<'_> {
        Modules {
            container: self,
            position: 0,
        }
    }
}

/// Iterator over parsed modules of one container.
pub struct Modules<'a> {
    container: &'a mut Container,
    position: usize,
}

impl Iterator for Modules<'_> {
    type Item = Result<Module>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, name) = self.container.entries.get(self.position)?.clone();
            self.position += 1;

            let mut data = Vec::new();
            let read = self
                .container
                .archive
                .by_index(index)
                .with_context(|| format!("failed to read entry {name}"))
                .and_then(|mut entry| {
                    entry
                        .read_to_end(&mut data)
                        .with_context(|| format!("failed to read entry {name}"))
                });
            if let Err(error) = read {
                return Some(Err(error));
            }

            match parse_class(&data) {
                Ok(class) => {
                    return Some(Ok(Module {
                        name,
                        classes: vec![class],
                    }));
                }
                // Damaged entry: skip it and keep scanning.
                Err(_) => continue,
            }
        }
    }
}

/// Parse one class file into its structural metadata.
pub fn parse_class(data: &[u8]) -> Result<ClassDef> {
    let parsed = class_file::parse(data).context("failed to parse class file")?;
    let constant_pool = parsed.constant_pool();

    let internal_name = resolve_class_name(constant_pool, parsed.this_class())?;
    let qualified_name = internal_name.replace('/', ".");

    let flags = parsed.access_flags();
    let is_interface = flags.contains(ClassFlags::ACC_INTERFACE);
    let is_abstract = flags.contains(ClassFlags::ACC_ABSTRACT);
    let is_enum = flags.contains(ClassFlags::ACC_ENUM);

    let mut fields = Vec::new();
    let mut enum_constants = Vec::new();
    for field in parsed.fields() {
        let name = resolve_utf8(constant_pool, field.name_index())
            .context("resolve field name")?;
        let descriptor = resolve_utf8(constant_pool, field.descriptor_index())
            .context("resolve field descriptor")?;
        if field.access_flags().contains(FieldFlags::ACC_ENUM) {
            enum_constants.push(name.clone());
        }
        fields.push(FieldDef {
            name,
            type_name: field_type_name(&descriptor)?,
        });
    }

    let mut methods = Vec::new();
    for method in parsed.methods() {
        let name = resolve_utf8(constant_pool, method.name_index())
            .context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let (parameter_types, return_type) = method_signature(&descriptor)?;

        let code = method.attributes().iter().find_map(|attribute| {
            match attribute {
                jclassfile::attributes::Attribute::Code { code, .. } => Some(code),
                _ => None,
            }
        });
        // A body that fails to decode degrades to "no literals" rather than
        // poisoning the whole class.
        let strings = code
            .map(|code| method_strings(code, constant_pool).unwrap_or_default())
            .unwrap_or_default();

        methods.push(MethodDef {
            name,
            return_type,
            parameter_types,
            modifiers: modifier_string(method.access_flags()),
            strings,
        });
    }

    Ok(ClassDef {
        qualified_name,
        is_interface,
        is_abstract,
        is_enum,
        fields,
        methods,
        enum_constants,
        strings: class_strings(constant_pool),
    })
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => bail!("constant pool entry {class_index} is not a class"),
    }
}

/// Render method access flags as Java modifier keywords in canonical order.
fn modifier_string(flags: &MethodFlags) -> String {
    let mut keywords = Vec::new();
    if flags.contains(MethodFlags::ACC_PUBLIC) {
        keywords.push("public");
    }
    if flags.contains(MethodFlags::ACC_PROTECTED) {
        keywords.push("protected");
    }
    if flags.contains(MethodFlags::ACC_PRIVATE) {
        keywords.push("private");
    }
    if flags.contains(MethodFlags::ACC_ABSTRACT) {
        keywords.push("abstract");
    }
    if flags.contains(MethodFlags::ACC_STATIC) {
        keywords.push("static");
    }
    if flags.contains(MethodFlags::ACC_FINAL) {
        keywords.push("final");
    }
    if flags.contains(MethodFlags::ACC_SYNCHRONIZED) {
        keywords.push("synchronized");
    }
    if flags.contains(MethodFlags::ACC_NATIVE) {
        keywords.push("native");
    }
    keywords.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_string_uses_canonical_order() {
        let flags = MethodFlags::ACC_STATIC | MethodFlags::ACC_PUBLIC | MethodFlags::ACC_FINAL;
        assert_eq!(modifier_string(&flags), "public static final");
    }

    #[test]
    fn rejects_garbage_class_data() {
        assert!(parse_class(b"nope").is_err());
    }
}
