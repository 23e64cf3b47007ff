//! Global index of every message and enum across the input files.

use std::collections::{HashMap, HashSet};

use crate::descriptor::{EnumDescriptor, FieldType, FileUnit, MessageDescriptor};
use crate::error::{CodegenError, Result};
use crate::naming::module_segments;

#[derive(Clone, Copy, Debug)]
pub enum TypeDescriptor<'a> {
    Message(&'a MessageDescriptor),
    Enum(&'a EnumDescriptor),
}

/// Where a schema type lives and what it is called in generated code.
#[derive(Clone, Debug)]
pub struct RegistryEntry<'a> {
    /// Module segments of the declaring file.
    pub module: Vec<String>,
    pub package: String,
    /// `Outer_Inner` for nested types.
    pub generated_name: String,
    /// `.pkg.Outer.Inner`.
    pub qualified_name: String,
    pub descriptor: TypeDescriptor<'a>,
}

impl<'a> RegistryEntry<'a> {
    pub fn message(&self) -> Option<&'a MessageDescriptor> {
        match self.descriptor {
            TypeDescriptor::Message(m) => Some(m),
            TypeDescriptor::Enum(_) => None,
        }
    }

    pub fn enumeration(&self) -> Option<&'a EnumDescriptor> {
        match self.descriptor {
            TypeDescriptor::Enum(e) => Some(e),
            TypeDescriptor::Message(_) => None,
        }
    }
}

/// Read-only after construction.
#[derive(Debug, Default)]
pub struct TypeRegistry<'a> {
    entries: HashMap<String, RegistryEntry<'a>>,
}

impl<'a> TypeRegistry<'a> {
    pub fn new(files: &'a [FileUnit]) -> Self {
        let mut registry = Self::default();
        for file in files {
            let module = module_segments(&file.path);
            let prefix = if file.package.is_empty() {
                String::new()
            } else {
                format!(".{}", file.package)
            };
            for en in &file.enums {
                registry.insert_enum(file, &module, &prefix, "", en);
            }
            for message in &file.messages {
                registry.insert_message(file, &module, &prefix, "", message);
            }
        }
        tracing::debug!(types = registry.entries.len(), "type registry built");
        registry
    }

    fn insert(&mut self, entry: RegistryEntry<'a>) {
        if let Some(previous) = self.entries.get(&entry.qualified_name) {
            tracing::warn!(
                name = %entry.qualified_name,
                previous = ?previous.module,
                "type registered twice, keeping the last declaration"
            );
        }
        self.entries.insert(entry.qualified_name.clone(), entry);
    }

    fn insert_enum(
        &mut self,
        file: &FileUnit,
        module: &[String],
        prefix: &str,
        outer: &str,
        en: &'a EnumDescriptor,
    ) {
        self.insert(RegistryEntry {
            module: module.to_vec(),
            package: file.package.clone(),
            generated_name: format!("{outer}{}", en.name),
            qualified_name: format!("{prefix}.{}", en.name),
            descriptor: TypeDescriptor::Enum(en),
        });
    }

    fn insert_message(
        &mut self,
        file: &FileUnit,
        module: &[String],
        prefix: &str,
        outer: &str,
        message: &'a MessageDescriptor,
    ) {
        let qualified_name = format!("{prefix}.{}", message.name);
        let generated_name = format!("{outer}{}", message.name);
        let nested_outer = format!("{generated_name}_");
        for en in &message.nested_enums {
            self.insert_enum(file, module, &qualified_name, &nested_outer, en);
        }
        for nested in &message.nested_messages {
            self.insert_message(file, module, &qualified_name, &nested_outer, nested);
        }
        self.insert(RegistryEntry {
            module: module.to_vec(),
            package: file.package.clone(),
            generated_name,
            qualified_name,
            descriptor: TypeDescriptor::Message(message),
        });
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry<'a>> {
        self.entries.get(name)
    }

    /// Look up `name`, failing with the referencing element when absent.
    pub fn resolve(&self, name: &str, referenced_by: &str) -> Result<&RegistryEntry<'a>> {
        self.entries
            .get(name)
            .ok_or_else(|| CodegenError::unresolved(name, referenced_by))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `target` can reach `owner` through singular message fields,
    /// meaning a field of type `target` inside `owner` must be boxed.
    pub fn is_recursive(&self, owner: &str, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if current == owner {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let Some(message) = self.get(current).and_then(RegistryEntry::message) else {
                continue;
            };
            for field in &message.fields {
                if field.field_type == FieldType::Message
                    && !field.is_repeated()
                    && let Some(name) = field.type_name.as_deref()
                {
                    stack.push(name);
                }
            }
        }
        false
    }
}
