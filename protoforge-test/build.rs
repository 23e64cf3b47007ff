//! Builds the test schemas as descriptors (no protoc needed) and compiles them
//! under several option sets, one output directory each.
//!
//! ```proto
//! // acme/entity.proto
//! enum Kind { KIND_UNSPECIFIED = 0; KIND_PERSON = 1; KIND_ROBOT = 2; KIND_HUMAN = 1; }
//! message Entity {
//!   string id = 1; string name = 2; int64 revision = 3; repeated int32 scores = 4;
//!   google.protobuf.Timestamp created_at = 5; map<string, string> labels = 6;
//!   Kind kind = 7; google.protobuf.Int32Value rank = 8; bytes avatar = 9;
//!   Entity parent = 10; repeated Entity children = 11; uint64 views = 12;
//!   double score = 13; optional string nickname = 14;
//! }
//! message BatchEntityRequest { repeated string ids = 1; }
//! message BatchEntityResponse { repeated Entity entities = 1; }
//! message BatchLabelRequest { repeated int64 ids = 1; }
//! message BatchLabelResponse { map<int64, string> labels = 1; }
//! message GetThingRequest { string id = 1; }
//! service EntityService {
//!   rpc BatchEntity(BatchEntityRequest) returns (BatchEntityResponse);
//!   rpc BatchLabel(BatchLabelRequest) returns (BatchLabelResponse);
//!   rpc GetThing(GetThingRequest) returns (Entity);
//!   rpc Watch(GetThingRequest) returns (stream Entity);
//!   rpc Upload(stream Entity) returns (BatchEntityResponse);
//! }
//!
//! // acme/shapes.proto
//! message Shape {
//!   oneof kind { double circle = 1; string square = 2; Entity owner = 3; }
//!   Kind tag = 4;
//! }
//! ```

use std::path::PathBuf;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumOptions, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto, OneofDescriptorProto,
    ServiceDescriptorProto,
};
use protoforge_build::{
    GenerationOptions, IdentifierCasing, LongRepresentation, OneofStyle, OptionalStyle, ServiceMethodCasing,
    StreamingReturnStyle, TargetRuntime,
};

fn field(name: &str, number: i32, ty: Type, label: Label) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        r#type: Some(ty as i32),
        label: Some(label as i32),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, label: Label, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty, label)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn map_entry(name: &str, key: Type, value: Type) -> DescriptorProto {
    DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(
            name,
            vec![
                field("key", 1, key, Label::Optional),
                field("value", 2, value, Label::Optional),
            ],
        )
    }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        ..Default::default()
    }
}

fn well_known_types() -> Vec<FileDescriptorProto> {
    let timestamp = FileDescriptorProto {
        name: Some("google/protobuf/timestamp.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![message(
            "Timestamp",
            vec![
                field("seconds", 1, Type::Int64, Label::Optional),
                field("nanos", 2, Type::Int32, Label::Optional),
            ],
        )],
        ..Default::default()
    };
    let wrappers = FileDescriptorProto {
        name: Some("google/protobuf/wrappers.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("Int32Value", vec![field("value", 1, Type::Int32, Label::Optional)]),
            message("StringValue", vec![field("value", 1, Type::String, Label::Optional)]),
        ],
        ..Default::default()
    };
    vec![timestamp, wrappers]
}

fn entity_file() -> FileDescriptorProto {
    let mut nickname = field("nickname", 14, Type::String, Label::Optional);
    nickname.proto3_optional = Some(true);
    nickname.oneof_index = Some(0);

    let mut entity = message(
        "Entity",
        vec![
            field("id", 1, Type::String, Label::Optional),
            field("name", 2, Type::String, Label::Optional),
            field("revision", 3, Type::Int64, Label::Optional),
            field("scores", 4, Type::Int32, Label::Repeated),
            typed("created_at", 5, Type::Message, Label::Optional, ".google.protobuf.Timestamp"),
            typed("labels", 6, Type::Message, Label::Repeated, ".acme.Entity.LabelsEntry"),
            typed("kind", 7, Type::Enum, Label::Optional, ".acme.Kind"),
            typed("rank", 8, Type::Message, Label::Optional, ".google.protobuf.Int32Value"),
            field("avatar", 9, Type::Bytes, Label::Optional),
            typed("parent", 10, Type::Message, Label::Optional, ".acme.Entity"),
            typed("children", 11, Type::Message, Label::Repeated, ".acme.Entity"),
            field("views", 12, Type::Uint64, Label::Optional),
            field("score", 13, Type::Double, Label::Optional),
            nickname,
        ],
    );
    entity.nested_type = vec![map_entry("LabelsEntry", Type::String, Type::String)];
    entity.oneof_decl = vec![OneofDescriptorProto {
        name: Some("_nickname".to_string()),
        ..Default::default()
    }];

    let mut label_response = message(
        "BatchLabelResponse",
        vec![typed("labels", 1, Type::Message, Label::Repeated, ".acme.BatchLabelResponse.LabelsEntry")],
    );
    label_response.nested_type = vec![map_entry("LabelsEntry", Type::Int64, Type::String)];

    let kind = EnumDescriptorProto {
        name: Some("Kind".to_string()),
        value: [("KIND_UNSPECIFIED", 0), ("KIND_PERSON", 1), ("KIND_ROBOT", 2), ("KIND_HUMAN", 1)]
            .into_iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
        options: Some(EnumOptions {
            allow_alias: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut upload = method("Upload", ".acme.Entity", ".acme.BatchEntityResponse");
    upload.client_streaming = Some(true);
    let mut watch = method("Watch", ".acme.GetThingRequest", ".acme.Entity");
    watch.server_streaming = Some(true);

    FileDescriptorProto {
        name: Some("acme/entity.proto".to_string()),
        package: Some("acme".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec![
            "google/protobuf/timestamp.proto".to_string(),
            "google/protobuf/wrappers.proto".to_string(),
        ],
        message_type: vec![
            entity,
            message("BatchEntityRequest", vec![field("ids", 1, Type::String, Label::Repeated)]),
            message(
                "BatchEntityResponse",
                vec![typed("entities", 1, Type::Message, Label::Repeated, ".acme.Entity")],
            ),
            message("BatchLabelRequest", vec![field("ids", 1, Type::Int64, Label::Repeated)]),
            label_response,
            message("GetThingRequest", vec![field("id", 1, Type::String, Label::Optional)]),
        ],
        enum_type: vec![kind],
        service: vec![ServiceDescriptorProto {
            name: Some("EntityService".to_string()),
            method: vec![
                method("BatchEntity", ".acme.BatchEntityRequest", ".acme.BatchEntityResponse"),
                method("BatchLabel", ".acme.BatchLabelRequest", ".acme.BatchLabelResponse"),
                method("GetThing", ".acme.GetThingRequest", ".acme.Entity"),
                watch,
                upload,
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn shapes_file() -> FileDescriptorProto {
    let members = [
        field("circle", 1, Type::Double, Label::Optional),
        field("square", 2, Type::String, Label::Optional),
        typed("owner", 3, Type::Message, Label::Optional, ".acme.Entity"),
    ];
    let mut fields: Vec<_> = members
        .into_iter()
        .map(|mut member| {
            member.oneof_index = Some(0);
            member
        })
        .collect();
    fields.push(typed("tag", 4, Type::Enum, Label::Optional, ".acme.Kind"));

    let mut shape = message("Shape", fields);
    shape.oneof_decl = vec![OneofDescriptorProto {
        name: Some("kind".to_string()),
        ..Default::default()
    }];

    FileDescriptorProto {
        name: Some("acme/shapes.proto".to_string()),
        package: Some("acme".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["acme/entity.proto".to_string()],
        message_type: vec![shape],
        ..Default::default()
    }
}

fn descriptor_set() -> FileDescriptorSet {
    let mut file = well_known_types();
    file.push(entity_file());
    file.push(shapes_file());
    FileDescriptorSet { file }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    let variants = [
        ("plain", GenerationOptions::default()),
        (
            "batching",
            GenerationOptions::default()
                .with_context_propagation(true)
                .with_oneof_style(OneofStyle::DiscriminatedUnion)
                .with_optional_style(OptionalStyle::NativeOptionalProperty)
                .with_long_representation(LongRepresentation::NativeWide),
        ),
        (
            "strings",
            GenerationOptions::default()
                .with_long_representation(LongRepresentation::DecimalString)
                .with_identifier_casing(IdentifierCasing::Verbatim)
                .with_target_runtime(TargetRuntime::NodeLike)
                .with_service_method_casing(ServiceMethodCasing::AsDeclared)
                .with_streaming_return_style(StreamingReturnStyle::ReactiveStream),
        ),
        (
            "controllers",
            GenerationOptions::from_parameter("nestJs=true,addGrpcMetadata=true"),
        ),
    ];

    for (name, options) in variants {
        protoforge_build::compile_descriptor_set(descriptor_set())
            .with_options(options)
            .out_dir(out_dir.join(name))
            .compile()?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
