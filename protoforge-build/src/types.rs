//! Type mapping engine.
//!
//! Every generator asks the [`TypeMapper`] how a field is laid out in the
//! generated struct: which Rust type holds it, how it is boxed, and whether
//! it collapses into a oneof union. The rules are applied in a fixed order:
//! wrappers, timestamps, maps, repeated fields, unions, then the scalar
//! table.

use std::collections::HashSet;

use proc_macro2::{Ident, TokenStream};
use quote::{ToTokens, format_ident, quote};

use crate::comments::SourceComments;
use crate::descriptor::{EnumDescriptor, EnumValue, FieldDescriptor, FieldType, MessageDescriptor, ScalarType};
use crate::error::{CodegenError, Result};
use crate::naming::{field_ident, json_name, relative_type_path, rust_ident, variant_ident};
use crate::options::{GenerationOptions, LongRepresentation, OneofStyle, OptionalStyle, TargetRuntime};
use crate::registry::{RegistryEntry, TypeDescriptor, TypeRegistry};

pub const TIMESTAMP: &str = ".google.protobuf.Timestamp";

/// The nine `google.protobuf.*Value` wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrapper {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    UInt32,
    Bool,
    String,
    Bytes,
}

impl Wrapper {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            ".google.protobuf.DoubleValue" => Wrapper::Double,
            ".google.protobuf.FloatValue" => Wrapper::Float,
            ".google.protobuf.Int64Value" => Wrapper::Int64,
            ".google.protobuf.UInt64Value" => Wrapper::UInt64,
            ".google.protobuf.Int32Value" => Wrapper::Int32,
            ".google.protobuf.UInt32Value" => Wrapper::UInt32,
            ".google.protobuf.BoolValue" => Wrapper::Bool,
            ".google.protobuf.StringValue" => Wrapper::String,
            ".google.protobuf.BytesValue" => Wrapper::Bytes,
            _ => return None,
        })
    }

    /// Scalar of the wrapper's `value` field.
    pub fn scalar(self) -> ScalarType {
        match self {
            Wrapper::Double => ScalarType::Double,
            Wrapper::Float => ScalarType::Float,
            Wrapper::Int64 => ScalarType::Int64,
            Wrapper::UInt64 => ScalarType::Uint64,
            Wrapper::Int32 => ScalarType::Int32,
            Wrapper::UInt32 => ScalarType::Uint32,
            Wrapper::Bool => ScalarType::Bool,
            Wrapper::String => ScalarType::String,
            Wrapper::Bytes => ScalarType::Bytes,
        }
    }

    /// Wrapped 64-bit values are always native integers; bytes are always
    /// `Vec<u8>`.
    pub fn rust_type(self) -> TokenStream {
        match self {
            Wrapper::Double => quote!(f64),
            Wrapper::Float => quote!(f32),
            Wrapper::Int64 => quote!(i64),
            Wrapper::UInt64 => quote!(u64),
            Wrapper::Int32 => quote!(i32),
            Wrapper::UInt32 => quote!(u32),
            Wrapper::Bool => quote!(bool),
            Wrapper::String => quote!(::std::string::String),
            Wrapper::Bytes => quote!(::std::vec::Vec<u8>),
        }
    }
}

/// What a single value of a field is.
#[derive(Clone, Copy, Debug)]
pub enum ValueKind<'a> {
    Scalar(ScalarType),
    Enum(&'a RegistryEntry<'a>),
    Wrapper(Wrapper),
    Timestamp,
    Message(&'a RegistryEntry<'a>),
}

#[derive(Clone, Debug)]
pub struct MapPlan<'a> {
    pub entry: &'a RegistryEntry<'a>,
    pub key: FieldPlan<'a>,
    pub value: FieldPlan<'a>,
}

#[derive(Clone, Debug)]
pub enum Layout<'a> {
    /// Always present; default-valued when unset.
    Plain,
    /// `Option<T>`.
    Optional,
    /// `Vec<T>`.
    Repeated,
    /// `HashMap<K, V>`.
    Map(Box<MapPlan<'a>>),
}

/// How one schema field is held by its generated struct.
#[derive(Clone, Debug)]
pub struct FieldPlan<'a> {
    pub field: &'a FieldDescriptor,
    pub ident: Ident,
    pub json_name: String,
    pub kind: ValueKind<'a>,
    pub layout: Layout<'a>,
    /// Message value stored behind a `Box` to break a type cycle.
    pub boxed: bool,
    /// Unset values are omitted from JSON rather than rendered `null`.
    pub property_optional: bool,
}

impl FieldPlan<'_> {
    pub fn is_packed(&self) -> bool {
        matches!(self.layout, Layout::Repeated)
            && match self.kind {
                ValueKind::Scalar(scalar) => scalar.is_packable(),
                ValueKind::Enum(_) => true,
                _ => false,
            }
    }
}

#[derive(Clone, Debug)]
pub struct VariantPlan<'a> {
    pub field: &'a FieldDescriptor,
    pub variant: Ident,
    pub json_name: String,
    pub kind: ValueKind<'a>,
    pub boxed: bool,
}

/// A oneof group collapsed into one property.
#[derive(Clone, Debug)]
pub struct UnionPlan<'a> {
    pub group: usize,
    pub ident: Ident,
    pub type_ident: Ident,
    pub variants: Vec<VariantPlan<'a>>,
}

#[derive(Clone, Debug)]
pub enum Member<'a> {
    Field(FieldPlan<'a>),
    Union(UnionPlan<'a>),
}

/// A mapped Rust type.
#[derive(Clone, Debug)]
pub enum GeneratedType {
    Primitive(TokenStream),
    Enum(TokenStream),
    Message { path: TokenStream, boxed: bool },
    DateTime,
    Nullable(Box<GeneratedType>),
    Sequence(Box<GeneratedType>),
    Map(Box<GeneratedType>, Box<GeneratedType>),
    Union(Ident),
}

impl ToTokens for GeneratedType {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let ty = match self {
            GeneratedType::Primitive(ty) | GeneratedType::Enum(ty) => ty.clone(),
            GeneratedType::Message { path, boxed: false } => path.clone(),
            GeneratedType::Message { path, boxed: true } => quote!(::std::boxed::Box<#path>),
            GeneratedType::DateTime => {
                quote!(::protoforge::chrono::DateTime<::protoforge::chrono::Utc>)
            }
            GeneratedType::Nullable(inner) => quote!(::core::option::Option<#inner>),
            GeneratedType::Sequence(inner) => quote!(::std::vec::Vec<#inner>),
            GeneratedType::Map(key, value) => {
                quote!(::std::collections::HashMap<#key, #value>)
            }
            GeneratedType::Union(ident) => quote!(::core::option::Option<#ident>),
        };
        tokens.extend(ty);
    }
}

/// One property of a generated struct.
#[derive(Clone, Debug)]
pub struct Property {
    pub ident: Ident,
    pub json_name: String,
    pub ty: GeneratedType,
    pub optional: bool,
    pub docs: Vec<String>,
}

/// Variants of a generated enum after alias collapsing.
#[derive(Clone, Debug)]
pub struct EnumPlan<'a> {
    /// One variant per distinct number, first declared name wins.
    pub variants: Vec<(Ident, &'a EnumValue)>,
    /// Every declared name (aliases included) with the variant it maps to.
    pub names: Vec<(&'a str, Ident)>,
    pub sentinel: Ident,
    pub sentinel_number: i32,
    pub default: Ident,
}

impl<'a> EnumPlan<'a> {
    pub fn new(en: &'a EnumDescriptor) -> Self {
        let mut numbers = HashSet::new();
        let mut idents = HashSet::new();
        let mut variants: Vec<(Ident, &'a EnumValue)> = Vec::new();
        let mut names = Vec::new();
        for value in &en.values {
            if let Some((ident, _)) = variants.iter().find(|(_, v)| v.number == value.number) {
                names.push((value.name.as_str(), ident.clone()));
                continue;
            }
            let mut ident = variant_ident(&value.name);
            if !idents.insert(ident.to_string()) {
                ident = format_ident!("{}_{}", ident, value.number.unsigned_abs());
                idents.insert(ident.to_string());
            }
            numbers.insert(value.number);
            names.push((value.name.as_str(), ident.clone()));
            variants.push((ident, value));
        }

        let sentinel = if idents.contains("Unrecognized") {
            format_ident!("Unrecognized_")
        } else {
            format_ident!("Unrecognized")
        };
        let sentinel_number = if numbers.contains(&-1) { i32::MIN } else { -1 };
        let default = variants
            .iter()
            .find(|(_, v)| v.number == 0)
            .or_else(|| variants.first())
            .map_or_else(|| sentinel.clone(), |(ident, _)| ident.clone());

        Self {
            variants,
            names,
            sentinel,
            sentinel_number,
            default,
        }
    }
}

/// Per-module type mapping.
pub struct TypeMapper<'a> {
    registry: &'a TypeRegistry<'a>,
    options: &'a GenerationOptions,
    module: &'a [String],
    comments: &'a SourceComments,
}

impl<'a> TypeMapper<'a> {
    pub fn new(
        registry: &'a TypeRegistry<'a>,
        options: &'a GenerationOptions,
        module: &'a [String],
        comments: &'a SourceComments,
    ) -> Self {
        Self {
            registry,
            options,
            module,
            comments,
        }
    }

    pub fn options(&self) -> &'a GenerationOptions {
        self.options
    }

    pub fn registry(&self) -> &'a TypeRegistry<'a> {
        self.registry
    }

    pub fn comments(&self) -> &'a SourceComments {
        self.comments
    }

    /// Path to a generated type, relative to the module being generated.
    pub fn type_path(&self, entry: &RegistryEntry<'_>) -> TokenStream {
        relative_type_path(self.module, &entry.module, &rust_ident(&entry.generated_name))
    }

    /// Path to the `{Name}Partial` companion of a generated message.
    pub fn partial_path(&self, entry: &RegistryEntry<'_>) -> TokenStream {
        let name = format_ident!("{}Partial", entry.generated_name);
        relative_type_path(self.module, &entry.module, &name)
    }

    fn value_kind(&self, field: &'a FieldDescriptor, referenced_by: &str) -> Result<ValueKind<'a>> {
        if let Some(scalar) = field.field_type.scalar() {
            return Ok(ValueKind::Scalar(scalar));
        }
        let name = field
            .type_name
            .as_deref()
            .ok_or_else(|| CodegenError::unhandled(referenced_by, "missing type name"))?;
        let entry = self.registry.resolve(name, referenced_by)?;
        match (field.field_type, entry.descriptor) {
            (FieldType::Enum, TypeDescriptor::Enum(_)) => Ok(ValueKind::Enum(entry)),
            (FieldType::Message, TypeDescriptor::Message(_)) => {
                if let Some(wrapper) = Wrapper::from_name(name) {
                    Ok(ValueKind::Wrapper(wrapper))
                } else if name == TIMESTAMP {
                    Ok(ValueKind::Timestamp)
                } else {
                    Ok(ValueKind::Message(entry))
                }
            }
            _ => Err(CodegenError::unhandled(
                referenced_by,
                format!("`{name}` does not match the field's declared kind"),
            )),
        }
    }

    /// Plan one field of `owner` (qualified `.pkg.Msg`), ignoring oneof
    /// collapsing.
    pub fn plan_field(&self, field: &'a FieldDescriptor, owner: &str) -> Result<FieldPlan<'a>> {
        let referenced_by = format!("{owner}.{}", field.name);
        let kind = self.value_kind(field, &referenced_by)?;
        let native_optional = self.options.optional_style == OptionalStyle::NativeOptionalProperty;
        let sibling_member = field.oneof_index.is_some();

        let layout = if field.is_repeated() {
            match kind {
                ValueKind::Message(entry) if entry.message().is_some_and(|m| m.is_map_entry) => {
                    Layout::Map(Box::new(self.plan_map(entry)?))
                }
                _ => Layout::Repeated,
            }
        } else if sibling_member || field.proto3_optional {
            Layout::Optional
        } else {
            match kind {
                ValueKind::Message(_) | ValueKind::Wrapper(_) | ValueKind::Timestamp => Layout::Optional,
                ValueKind::Scalar(_) | ValueKind::Enum(_) => Layout::Plain,
            }
        };

        let boxed = match (&layout, kind) {
            (Layout::Plain | Layout::Optional, ValueKind::Message(entry)) => {
                self.registry.is_recursive(owner, &entry.qualified_name)
            }
            _ => false,
        };

        let property_optional = matches!(layout, Layout::Optional)
            && (native_optional || sibling_member || field.proto3_optional);

        Ok(FieldPlan {
            field,
            ident: field_ident(&field.name),
            json_name: json_name(&field.name, self.options.identifier_casing),
            kind,
            layout,
            boxed,
            property_optional,
        })
    }

    fn plan_map(&self, entry: &'a RegistryEntry<'a>) -> Result<MapPlan<'a>> {
        let message = entry
            .message()
            .ok_or_else(|| CodegenError::unhandled(&entry.qualified_name, "map entry is not a message"))?;
        let (Some(key), Some(value)) = (message.map_key(), message.map_value()) else {
            return Err(CodegenError::unhandled(&entry.qualified_name, "map entry without key/value"));
        };
        let key = self.plan_field(key, &entry.qualified_name)?;
        if !matches!(key.kind, ValueKind::Scalar(s) if !s.is_float() && s != ScalarType::Bytes) {
            return Err(CodegenError::unhandled(
                &entry.qualified_name,
                "map keys must be integral, bool or string",
            ));
        }
        let value = self.plan_field(value, &entry.qualified_name)?;
        Ok(MapPlan { entry, key, value })
    }

    /// Members of `message` in declaration order. Under
    /// [`OneofStyle::DiscriminatedUnion`] each oneof group becomes one
    /// [`Member::Union`] placed where its first member was declared.
    pub fn members(&self, message: &'a MessageDescriptor, owner: &str) -> Result<Vec<Member<'a>>> {
        let unions = self.options.oneof_style == OneofStyle::DiscriminatedUnion;
        let owner_entry = self.registry.resolve(owner, owner)?;
        let mut placed = HashSet::new();
        let mut members = Vec::with_capacity(message.fields.len());
        for field in &message.fields {
            match field.oneof_index {
                Some(group) if unions => {
                    if placed.insert(group) {
                        members.push(Member::Union(self.plan_union(message, owner_entry, group)?));
                    }
                }
                _ => members.push(Member::Field(self.plan_field(field, owner)?)),
            }
        }
        Ok(members)
    }

    fn plan_union(
        &self,
        message: &'a MessageDescriptor,
        owner: &RegistryEntry<'_>,
        group: usize,
    ) -> Result<UnionPlan<'a>> {
        let name = &message.oneofs[group].name;
        let variants = message
            .oneof_members(group)
            .map(|field| {
                let plan = self.plan_field(field, &owner.qualified_name)?;
                if !matches!(plan.layout, Layout::Optional) {
                    return Err(CodegenError::unhandled(
                        format!("{}.{}", owner.qualified_name, field.name),
                        "oneof members cannot be repeated",
                    ));
                }
                Ok(VariantPlan {
                    field,
                    variant: variant_ident(&field.name),
                    json_name: plan.json_name,
                    kind: plan.kind,
                    boxed: plan.boxed,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(UnionPlan {
            group,
            ident: field_ident(name),
            type_ident: union_type_ident(&owner.generated_name, name),
            variants,
        })
    }

    /// Rust type of one value of `kind`.
    pub fn value_type(&self, kind: ValueKind<'_>, boxed: bool) -> GeneratedType {
        match kind {
            ValueKind::Scalar(scalar) => GeneratedType::Primitive(self.scalar_type(scalar)),
            ValueKind::Enum(entry) => GeneratedType::Enum(self.type_path(entry)),
            ValueKind::Wrapper(wrapper) => GeneratedType::Primitive(wrapper.rust_type()),
            ValueKind::Timestamp => GeneratedType::DateTime,
            ValueKind::Message(entry) => GeneratedType::Message {
                path: self.type_path(entry),
                boxed,
            },
        }
    }

    pub fn scalar_type(&self, scalar: ScalarType) -> TokenStream {
        let decimal = self.options.long_representation == LongRepresentation::DecimalString;
        match scalar {
            ScalarType::Double => quote!(f64),
            ScalarType::Float => quote!(f32),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => quote!(i32),
            ScalarType::Uint32 | ScalarType::Fixed32 => quote!(u32),
            s if s.is_long() && decimal => quote!(::std::string::String),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => quote!(i64),
            ScalarType::Uint64 | ScalarType::Fixed64 => quote!(u64),
            ScalarType::Bool => quote!(bool),
            ScalarType::String => quote!(::std::string::String),
            ScalarType::Bytes => match self.options.target_runtime {
                TargetRuntime::NodeLike => quote!(::protoforge::bytes::Bytes),
                TargetRuntime::BrowserLike | TargetRuntime::Either => quote!(::std::vec::Vec<u8>),
            },
        }
    }

    /// Whether `bytes` fields are `bytes::Bytes` rather than `Vec<u8>`.
    pub fn shared_bytes(&self) -> bool {
        self.options.target_runtime == TargetRuntime::NodeLike
    }

    /// Whether 64-bit integers are held as decimal strings.
    pub fn decimal_longs(&self) -> bool {
        self.options.long_representation == LongRepresentation::DecimalString
    }

    /// Type of the struct field holding `plan`.
    pub fn field_type(&self, plan: &FieldPlan<'_>) -> GeneratedType {
        let value = self.value_type(plan.kind, plan.boxed);
        match &plan.layout {
            Layout::Plain => value,
            Layout::Optional => GeneratedType::Nullable(Box::new(value)),
            Layout::Repeated => GeneratedType::Sequence(Box::new(value)),
            Layout::Map(map) => GeneratedType::Map(
                Box::new(self.value_type(map.key.kind, false)),
                Box::new(self.value_type(map.value.kind, false)),
            ),
        }
    }

    /// Zero value of a `Plain` field of `kind`.
    pub fn default_value(&self, kind: ValueKind<'_>) -> TokenStream {
        match kind {
            ValueKind::Scalar(s) if s.is_long() && self.decimal_longs() => {
                quote!(::std::string::String::from("0"))
            }
            ValueKind::Scalar(ScalarType::Bool) => quote!(false),
            ValueKind::Scalar(s) if s.is_float() => quote!(0.0),
            ValueKind::Scalar(ScalarType::String | ScalarType::Bytes) => {
                quote!(::core::default::Default::default())
            }
            ValueKind::Scalar(_) => quote!(0),
            ValueKind::Enum(entry) => {
                let path = self.type_path(entry);
                let variant = entry
                    .enumeration()
                    .map(|en| EnumPlan::new(en).default)
                    .unwrap_or_else(|| format_ident!("Unrecognized"));
                quote!(#path::#variant)
            }
            ValueKind::Wrapper(_) | ValueKind::Timestamp | ValueKind::Message(_) => {
                quote!(::core::default::Default::default())
            }
        }
    }

    /// Initial value of a member in the base instance.
    pub fn member_default(&self, member: &Member<'_>) -> TokenStream {
        match member {
            Member::Union(_) => quote!(::core::option::Option::None),
            Member::Field(plan) => match plan.layout {
                Layout::Plain => self.default_value(plan.kind),
                Layout::Optional => quote!(::core::option::Option::None),
                Layout::Repeated => quote!(::std::vec::Vec::new()),
                Layout::Map(_) => quote!(::std::collections::HashMap::new()),
            },
        }
    }

    pub fn property(&self, member: &Member<'_>) -> Property {
        match member {
            Member::Field(plan) => Property {
                ident: plan.ident.clone(),
                json_name: plan.json_name.clone(),
                ty: self.field_type(plan),
                optional: plan.property_optional,
                docs: self.comments.lines(&plan.field.path),
            },
            Member::Union(union) => {
                let mut docs = Vec::new();
                for variant in &union.variants {
                    let lines = self.comments.lines(&variant.field.path);
                    if !lines.is_empty() && !docs.is_empty() {
                        docs.push(String::new());
                    }
                    docs.extend(lines);
                }
                Property {
                    ident: union.ident.clone(),
                    json_name: union.ident.to_string(),
                    ty: GeneratedType::Union(union.type_ident.clone()),
                    optional: true,
                    docs,
                }
            }
        }
    }

    /// The property holding `field` of `owner`.
    pub fn map_field(&self, field: &FieldDescriptor, message: &'a MessageDescriptor, owner: &str) -> Result<Property> {
        let members = self.members(message, owner)?;
        members
            .iter()
            .find(|member| match member {
                Member::Field(plan) => plan.field.number == field.number,
                Member::Union(union) => field.oneof_index == Some(union.group),
            })
            .map(|member| self.property(member))
            .ok_or_else(|| CodegenError::unhandled(format!("{owner}.{}", field.name), "field not declared by its message"))
    }
}

/// `{Message}_{Group}Oneof`.
pub fn union_type_ident(message: &str, group: &str) -> Ident {
    format_ident!("{}_{}Oneof", message, variant_ident(group).to_string().trim_start_matches("r#"))
}
