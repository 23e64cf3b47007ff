//! Owned schema model converted from `prost_types` descriptors.
//!
//! Conversion rejects shapes no generator handles (groups, out-of-range
//! field numbers) up front, so every later stage can match exhaustively.

use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type as ProtoType};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    ServiceDescriptorProto,
};

use crate::comments::SourceComments;
use crate::error::{CodegenError, Result};

const MAX_FIELD_NUMBER: i32 = (1 << 29) - 1;

// Field numbers of the descriptor.proto fields that source-code-info paths
// are built from.
const FILE_MESSAGE_TYPE: i32 = 4;
const FILE_ENUM_TYPE: i32 = 5;
const FILE_SERVICE: i32 = 6;
pub(crate) const FILE_SYNTAX: i32 = 12;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;
const MESSAGE_ENUM_TYPE: i32 = 4;
const MESSAGE_ONEOF_DECL: i32 = 8;
const ENUM_VALUE: i32 = 2;
const SERVICE_METHOD: i32 = 2;

/// Scalar field types, i.e. every [`FieldType`] except enums and messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    pub fn wire_type(self) -> u32 {
        match self {
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => 1,
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => 5,
            ScalarType::String | ScalarType::Bytes => 2,
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool => 0,
        }
    }

    /// Numeric and bool scalars can be packed when repeated.
    pub fn is_packable(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// The 64-bit integer family, whose Rust type follows `LongRepresentation`.
    pub fn is_long(self) -> bool {
        matches!(
            self,
            ScalarType::Int64
                | ScalarType::Uint64
                | ScalarType::Sint64
                | ScalarType::Fixed64
                | ScalarType::Sfixed64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ScalarType::Uint32 | ScalarType::Uint64 | ScalarType::Fixed32 | ScalarType::Fixed64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Double | ScalarType::Float)
    }

    /// Name of the `Reader`/`Writer` method for this type.
    pub fn codec_method(self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }
}

/// Closed set of protobuf field types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
}

impl FieldType {
    pub fn scalar(self) -> Option<ScalarType> {
        Some(match self {
            FieldType::Double => ScalarType::Double,
            FieldType::Float => ScalarType::Float,
            FieldType::Int32 => ScalarType::Int32,
            FieldType::Int64 => ScalarType::Int64,
            FieldType::Uint32 => ScalarType::Uint32,
            FieldType::Uint64 => ScalarType::Uint64,
            FieldType::Sint32 => ScalarType::Sint32,
            FieldType::Sint64 => ScalarType::Sint64,
            FieldType::Fixed32 => ScalarType::Fixed32,
            FieldType::Fixed64 => ScalarType::Fixed64,
            FieldType::Sfixed32 => ScalarType::Sfixed32,
            FieldType::Sfixed64 => ScalarType::Sfixed64,
            FieldType::Bool => ScalarType::Bool,
            FieldType::String => ScalarType::String,
            FieldType::Bytes => ScalarType::Bytes,
            FieldType::Enum | FieldType::Message => return None,
        })
    }

    pub fn wire_type(self) -> u32 {
        match self {
            FieldType::Enum => 0,
            FieldType::Message => 2,
            other => other.scalar().map_or(2, ScalarType::wire_type),
        }
    }

    /// Wire type of a packed block, when this type can be packed.
    pub fn packed_wire_type(self) -> Option<u32> {
        match self {
            FieldType::Enum => Some(2),
            FieldType::Message => None,
            other => other.scalar().filter(|s| s.is_packable()).map(|_| 2),
        }
    }

    pub fn is_long(self) -> bool {
        self.scalar().is_some_and(ScalarType::is_long)
    }

    fn from_proto(ty: ProtoType, field: &str) -> Result<Self> {
        Ok(match ty {
            ProtoType::Double => FieldType::Double,
            ProtoType::Float => FieldType::Float,
            ProtoType::Int64 => FieldType::Int64,
            ProtoType::Uint64 => FieldType::Uint64,
            ProtoType::Int32 => FieldType::Int32,
            ProtoType::Fixed64 => FieldType::Fixed64,
            ProtoType::Fixed32 => FieldType::Fixed32,
            ProtoType::Bool => FieldType::Bool,
            ProtoType::String => FieldType::String,
            ProtoType::Message => FieldType::Message,
            ProtoType::Bytes => FieldType::Bytes,
            ProtoType::Uint32 => FieldType::Uint32,
            ProtoType::Enum => FieldType::Enum,
            ProtoType::Sfixed32 => FieldType::Sfixed32,
            ProtoType::Sfixed64 => FieldType::Sfixed64,
            ProtoType::Sint32 => FieldType::Sint32,
            ProtoType::Sint64 => FieldType::Sint64,
            ProtoType::Group => {
                return Err(CodegenError::unhandled(field, "groups are not supported"));
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Optional,
    Repeated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
    Editions,
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub field_type: FieldType,
    pub label: Label,
    /// Fully qualified `.pkg.Type` name for enum and message fields.
    pub type_name: Option<String>,
    /// Index of the real (non-synthetic) oneof this field belongs to.
    pub oneof_index: Option<usize>,
    /// `optional` on a proto3 scalar: explicit presence.
    pub proto3_optional: bool,
    pub path: Vec<i32>,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    /// Tag for this field written with `wire_type`.
    pub fn tag(&self, wire_type: u32) -> u32 {
        (self.number << 3) | wire_type
    }
}

#[derive(Clone, Debug)]
pub struct OneofDescriptor {
    pub name: String,
    pub path: Vec<i32>,
}

#[derive(Clone, Debug)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub nested_messages: Vec<MessageDescriptor>,
    pub nested_enums: Vec<EnumDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
    /// Synthetic key/value message backing a `map<K, V>` field.
    pub is_map_entry: bool,
    pub path: Vec<i32>,
}

impl MessageDescriptor {
    /// Fields of oneof group `index`, in declaration order.
    pub fn oneof_members(&self, index: usize) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |f| f.oneof_index == Some(index))
    }

    pub fn map_key(&self) -> Option<&FieldDescriptor> {
        self.is_map_entry.then(|| &self.fields[0])
    }

    pub fn map_value(&self) -> Option<&FieldDescriptor> {
        self.is_map_entry.then(|| &self.fields[1])
    }
}

#[derive(Clone, Debug)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
    pub path: Vec<i32>,
}

#[derive(Clone, Debug)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<EnumValue>,
    pub path: Vec<i32>,
}

#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub path: Vec<i32>,
}

#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
    pub path: Vec<i32>,
}

/// One `.proto` file.
#[derive(Clone, Debug)]
pub struct FileUnit {
    pub path: String,
    pub package: String,
    pub syntax: Syntax,
    pub messages: Vec<MessageDescriptor>,
    pub enums: Vec<EnumDescriptor>,
    pub services: Vec<ServiceDescriptor>,
    pub dependencies: Vec<String>,
    pub comments: SourceComments,
}

impl FileUnit {
    pub fn from_proto(file: &FileDescriptorProto) -> Result<Self> {
        let path = file.name().to_string();
        if path.is_empty() {
            return Err(CodegenError::InvalidDescriptor(
                "file descriptor without a name".to_string(),
            ));
        }
        let package = file.package().to_string();
        let prefix = qualified_prefix(&package);

        let messages = file
            .message_type
            .iter()
            .enumerate()
            .map(|(i, m)| convert_message(m, &prefix, vec![FILE_MESSAGE_TYPE, i as i32]))
            .collect::<Result<Vec<_>>>()?;
        let enums = file
            .enum_type
            .iter()
            .enumerate()
            .map(|(i, e)| convert_enum(e, vec![FILE_ENUM_TYPE, i as i32]))
            .collect();
        let services = file
            .service
            .iter()
            .enumerate()
            .map(|(i, s)| convert_service(s, vec![FILE_SERVICE, i as i32]))
            .collect();

        let syntax = match file.syntax() {
            "proto3" => Syntax::Proto3,
            "editions" => Syntax::Editions,
            _ => Syntax::Proto2,
        };

        Ok(FileUnit {
            path,
            package,
            syntax,
            messages,
            enums,
            services,
            dependencies: file.dependency.clone(),
            comments: file
                .source_code_info
                .as_ref()
                .map(SourceComments::from_proto)
                .unwrap_or_default(),
        })
    }
}

fn qualified_prefix(package: &str) -> String {
    if package.is_empty() {
        String::new()
    } else {
        format!(".{package}")
    }
}

fn child_path(parent: &[i32], field: i32, index: usize) -> Vec<i32> {
    let mut path = parent.to_vec();
    path.push(field);
    path.push(index as i32);
    path
}

fn convert_message(message: &DescriptorProto, prefix: &str, path: Vec<i32>) -> Result<MessageDescriptor> {
    let name = message.name().to_string();
    let qualified = format!("{prefix}.{name}");

    let fields = message
        .field
        .iter()
        .enumerate()
        .map(|(i, f)| convert_field(f, &qualified, child_path(&path, MESSAGE_FIELD, i)))
        .collect::<Result<Vec<_>>>()?;

    let nested_messages = message
        .nested_type
        .iter()
        .enumerate()
        .map(|(i, m)| convert_message(m, &qualified, child_path(&path, MESSAGE_NESTED_TYPE, i)))
        .collect::<Result<Vec<_>>>()?;

    let nested_enums = message
        .enum_type
        .iter()
        .enumerate()
        .map(|(i, e)| convert_enum(e, child_path(&path, MESSAGE_ENUM_TYPE, i)))
        .collect();

    let oneofs = message
        .oneof_decl
        .iter()
        .enumerate()
        .map(|(i, o)| OneofDescriptor {
            name: o.name().to_string(),
            path: child_path(&path, MESSAGE_ONEOF_DECL, i),
        })
        .collect::<Vec<_>>();

    for field in &fields {
        if let Some(index) = field.oneof_index
            && index >= oneofs.len()
        {
            return Err(CodegenError::InvalidDescriptor(format!(
                "field `{qualified}.{}` references missing oneof {index}",
                field.name
            )));
        }
    }

    let marked = message
        .options
        .as_ref()
        .is_some_and(|o| o.map_entry());
    let is_map_entry = marked
        && fields.len() == 2
        && fields[0].name == "key"
        && fields[1].name == "value";

    Ok(MessageDescriptor {
        name,
        fields,
        nested_messages,
        nested_enums,
        oneofs,
        is_map_entry,
        path,
    })
}

fn convert_field(field: &FieldDescriptorProto, owner: &str, path: Vec<i32>) -> Result<FieldDescriptor> {
    let qualified = format!("{owner}.{}", field.name());
    let number = field.number();
    if !(1..=MAX_FIELD_NUMBER).contains(&number) {
        return Err(CodegenError::InvalidDescriptor(format!(
            "field `{qualified}` has out-of-range number {number}"
        )));
    }

    let proto_type = field
        .r#type
        .and_then(|t| ProtoType::try_from(t).ok())
        .ok_or_else(|| CodegenError::unhandled(&qualified, "missing or unknown field type"))?;
    let field_type = FieldType::from_proto(proto_type, &qualified)?;

    let type_name = field.type_name.clone().filter(|n| !n.is_empty());
    if matches!(field_type, FieldType::Enum | FieldType::Message) && type_name.is_none() {
        return Err(CodegenError::unhandled(
            &qualified,
            "composite field without a type name",
        ));
    }

    let label = match field.label() {
        ProtoLabel::Repeated => Label::Repeated,
        ProtoLabel::Optional | ProtoLabel::Required => Label::Optional,
    };
    let proto3_optional = field.proto3_optional();

    Ok(FieldDescriptor {
        name: field.name().to_string(),
        number: number as u32,
        field_type,
        label,
        type_name,
        // proto3 `optional` fields sit in a synthetic oneof that is not emitted
        oneof_index: field
            .oneof_index
            .filter(|_| !proto3_optional)
            .map(|i| i as usize),
        proto3_optional,
        path,
    })
}

fn convert_enum(en: &EnumDescriptorProto, path: Vec<i32>) -> EnumDescriptor {
    EnumDescriptor {
        name: en.name().to_string(),
        values: en
            .value
            .iter()
            .enumerate()
            .map(|(i, v)| EnumValue {
                name: v.name().to_string(),
                number: v.number(),
                path: child_path(&path, ENUM_VALUE, i),
            })
            .collect(),
        path,
    }
}

fn convert_service(service: &ServiceDescriptorProto, path: Vec<i32>) -> ServiceDescriptor {
    ServiceDescriptor {
        name: service.name().to_string(),
        methods: service
            .method
            .iter()
            .enumerate()
            .map(|(i, m)| MethodDescriptor {
                name: m.name().to_string(),
                input_type: m.input_type().to_string(),
                output_type: m.output_type().to_string(),
                client_streaming: m.client_streaming(),
                server_streaming: m.server_streaming(),
                path: child_path(&path, SERVICE_METHOD, i),
            })
            .collect(),
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{MessageOptions, OneofDescriptorProto};

    fn field(name: &str, number: i32, ty: ProtoType) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(ty as i32),
            label: Some(ProtoLabel::Optional as i32),
            ..Default::default()
        }
    }

    fn file(messages: Vec<DescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("demo/simple.proto".to_string()),
            package: Some("demo".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: messages,
            ..Default::default()
        }
    }

    #[test]
    fn wire_types_follow_protobuf() {
        assert_eq!(FieldType::Int64.wire_type(), 0);
        assert_eq!(FieldType::Fixed64.wire_type(), 1);
        assert_eq!(FieldType::Message.wire_type(), 2);
        assert_eq!(FieldType::Sfixed32.wire_type(), 5);
        assert_eq!(FieldType::Enum.packed_wire_type(), Some(2));
        assert_eq!(FieldType::String.packed_wire_type(), None);
        assert!(FieldType::Sint64.is_long());
        assert!(!FieldType::Int32.is_long());
    }

    #[test]
    fn converts_nested_messages_with_paths() {
        let message = DescriptorProto {
            name: Some("Outer".to_string()),
            field: vec![field("name", 1, ProtoType::String)],
            nested_type: vec![DescriptorProto {
                name: Some("Inner".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let unit = FileUnit::from_proto(&file(vec![message])).unwrap();
        assert_eq!(unit.syntax, Syntax::Proto3);
        let outer = &unit.messages[0];
        assert_eq!(outer.path, vec![4, 0]);
        assert_eq!(outer.fields[0].path, vec![4, 0, 2, 0]);
        assert_eq!(outer.nested_messages[0].path, vec![4, 0, 3, 0]);
    }

    #[test]
    fn groups_are_unhandled() {
        let message = DescriptorProto {
            name: Some("Legacy".to_string()),
            field: vec![field("g", 1, ProtoType::Group)],
            ..Default::default()
        };
        let err = FileUnit::from_proto(&file(vec![message])).unwrap_err();
        assert!(matches!(err, CodegenError::UnhandledFieldShape { ref field, .. } if field == ".demo.Legacy.g"));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let message = DescriptorProto {
            name: Some("Bad".to_string()),
            field: vec![field("x", 0, ProtoType::Int32)],
            ..Default::default()
        };
        assert!(matches!(
            FileUnit::from_proto(&file(vec![message])),
            Err(CodegenError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn map_entry_requires_marker_and_shape() {
        let entry = |names: [&str; 2]| DescriptorProto {
            name: Some("TagsEntry".to_string()),
            field: vec![
                field(names[0], 1, ProtoType::String),
                field(names[1], 2, ProtoType::Int32),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let unit = FileUnit::from_proto(&file(vec![entry(["key", "value"]), entry(["k", "v"])])).unwrap();
        assert!(unit.messages[0].is_map_entry);
        assert!(!unit.messages[1].is_map_entry);
    }

    #[test]
    fn proto3_optional_leaves_synthetic_oneof() {
        let mut optional = field("maybe", 1, ProtoType::Int32);
        optional.proto3_optional = Some(true);
        optional.oneof_index = Some(0);
        let message = DescriptorProto {
            name: Some("Opt".to_string()),
            field: vec![optional],
            oneof_decl: vec![OneofDescriptorProto {
                name: Some("_maybe".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let unit = FileUnit::from_proto(&file(vec![message])).unwrap();
        let maybe = &unit.messages[0].fields[0];
        assert!(maybe.proto3_optional);
        assert_eq!(maybe.oneof_index, None);
    }
}
