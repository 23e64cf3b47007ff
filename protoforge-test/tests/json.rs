use std::collections::HashMap;

use chrono::DateTime;
use protoforge::{FromPartial, JsonError, JsonMessage, Message};
use protoforge_test::{batching, plain, strings};
use serde_json::json;

fn sample() -> plain::acme::entity::Entity {
    plain::acme::entity::Entity {
        id: "e-1".to_string(),
        revision: 42,
        scores: vec![1, 2],
        created_at: DateTime::from_timestamp(1_000_000, 500_000_000),
        labels: HashMap::from([("team".to_string(), "core".to_string())]),
        kind: plain::acme::entity::Kind::KindRobot,
        rank: Some(5),
        avatar: vec![1, 2, 3],
        views: u64::MAX,
        score: 0.25,
        ..Default::default()
    }
}

#[test]
fn test_canonical_json_shape() {
    let value = sample().to_json();
    assert_eq!(value["id"], json!("e-1"));
    assert_eq!(value["revision"], json!(42));
    assert_eq!(value["scores"], json!([1, 2]));
    assert_eq!(value["createdAt"], json!("1970-01-12T13:46:40.500Z"));
    assert_eq!(value["labels"], json!({"team": "core"}));
    assert_eq!(value["kind"], json!("KIND_ROBOT"));
    assert_eq!(value["rank"], json!(5));
    assert_eq!(value["avatar"], json!("AQID"));
    assert_eq!(value["views"], json!(u64::MAX));
    assert_eq!(value["score"], json!(0.25));
    assert!(value["parent"].is_null(), "unset message fields are written as null");
    assert!(value.get("nickname").is_none(), "unset optional scalars are omitted");
}

#[test]
fn test_json_round_trip() {
    let entity = sample();
    let decoded = plain::acme::entity::Entity::from_json(&entity.to_json()).unwrap();
    assert_eq!(decoded, entity);
}

#[test]
fn test_reader_accepts_proto_names_and_lenient_scalars() {
    let entity = plain::acme::entity::Entity::from_json(&json!({
        "created_at": {"seconds": "1000000", "nanos": 500000000},
        "revision": "42",
        "views": "18446744073709551615",
        "score": "NaN",
        "avatar": "AQI",
        "kind": 2,
        "nickname": "ada",
    }))
    .unwrap();
    assert_eq!(entity.created_at, DateTime::from_timestamp(1_000_000, 500_000_000));
    assert_eq!(entity.revision, 42);
    assert_eq!(entity.views, u64::MAX);
    assert!(entity.score.is_nan());
    assert_eq!(entity.avatar, vec![1, 2]);
    assert_eq!(entity.kind, plain::acme::entity::Kind::KindRobot);
    assert_eq!(entity.nickname.as_deref(), Some("ada"));
}

#[test]
fn test_enum_names_aliases_and_unknown_values() {
    use plain::acme::entity::Kind;

    assert_eq!(Kind::from_json(&json!("KIND_HUMAN")), Kind::KindPerson);
    assert_eq!(Kind::from_json(&json!("KIND_MARTIAN")), Kind::Unrecognized);
    assert_eq!(Kind::from_json(&json!(99)), Kind::Unrecognized);
    assert_eq!(Kind::Unrecognized.to_json(), "UNKNOWN");
    assert_eq!(Kind::KindPerson.to_json(), "KIND_PERSON");
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = plain::acme::entity::Entity::from_json(&json!({"revision": "forty-two"})).unwrap_err();
    assert!(matches!(err, JsonError::InvalidValue { .. }), "unexpected error: {err}");

    let err = plain::acme::entity::Entity::from_json(&json!({"rank": 3_000_000_000u64})).unwrap_err();
    assert!(matches!(err, JsonError::OutOfRange { .. }), "unexpected error: {err}");

    assert!(plain::acme::entity::Entity::from_json(&json!([1, 2])).is_err());
}

#[test]
fn test_wide_longs_are_json_strings() {
    let entity = batching::acme::entity::Entity {
        revision: -9_007_199_254_740_993,
        views: 7,
        ..Default::default()
    };
    let value = entity.to_json();
    assert_eq!(value["revision"], json!("-9007199254740993"));
    assert_eq!(value["views"], json!("7"));
    assert!(value.get("parent").is_none(), "native optional properties are omitted");

    let decoded = batching::acme::entity::Entity::from_json(&value).unwrap();
    assert_eq!(decoded.revision, -9_007_199_254_740_993);
    assert_eq!(decoded.views, 7);
}

#[test]
fn test_decimal_string_longs_and_verbatim_names() {
    let entity = strings::acme::entity::Entity {
        revision: "9007199254740993".to_string(),
        created_at: DateTime::from_timestamp(0, 0),
        avatar: bytes::Bytes::from_static(b"\x01\x02\x03"),
        ..Default::default()
    };
    let value = entity.to_json();
    assert_eq!(value["revision"], json!("9007199254740993"));
    assert_eq!(value["created_at"], json!("1970-01-01T00:00:00Z"));
    assert!(value.get("createdAt").is_none());

    let decoded = strings::acme::entity::Entity::from_json(&json!({"revision": 12, "avatar": "AQID"})).unwrap();
    assert_eq!(decoded.revision, "12");
    assert_eq!(decoded.avatar, bytes::Bytes::from_static(b"\x01\x02\x03"));

    let binary = strings::acme::entity::Entity::decode_bytes(&entity.encode_to_vec()).unwrap();
    assert_eq!(binary, entity);
}

#[test]
fn test_decimal_string_longs_are_range_checked_per_type() {
    use strings::acme::entity::{BatchLabelResponse, Entity};

    let err = Entity::from_json(&json!({"revision": "18446744073709551615"})).unwrap_err();
    assert!(matches!(err, JsonError::OutOfRange { target: "int64", .. }), "unexpected error: {err}");
    let err = Entity::from_json(&json!({"views": "-1"})).unwrap_err();
    assert!(matches!(err, JsonError::OutOfRange { target: "uint64", .. }), "unexpected error: {err}");

    let entity = Entity::from_json(&json!({"revision": "-5", "views": "18446744073709551615"})).unwrap();
    assert_eq!(entity.revision, "-5");
    assert_eq!(entity.views, "18446744073709551615");

    let labels = BatchLabelResponse::from_json(&json!({"labels": {"-1": "neg", " 7": "seven"}})).unwrap();
    assert_eq!(labels.labels.get("-1").map(String::as_str), Some("neg"));
    assert_eq!(labels.labels.get("7").map(String::as_str), Some("seven"));
    let err = BatchLabelResponse::from_json(&json!({"labels": {"seven": "x"}})).unwrap_err();
    assert!(matches!(err, JsonError::MapKey { .. }), "unexpected error: {err}");
}

#[test]
fn test_malformed_decimal_string_encodes_as_zero() {
    use strings::acme::entity::Entity;

    let entity = Entity {
        revision: "not a number".to_string(),
        views: "-1".to_string(),
        ..Default::default()
    };
    assert!(entity.encode_to_vec().is_empty());
}

#[test]
fn test_union_writes_only_the_active_member() {
    use batching::acme::shapes::{Shape, Shape_KindOneof};

    let shape = Shape {
        kind: Some(Shape_KindOneof::Square("edge".to_string())),
        ..Default::default()
    };
    let value = shape.to_json();
    assert_eq!(value["square"], json!("edge"));
    assert!(value.get("circle").is_none());
    assert!(value.get("owner").is_none());
    assert_eq!(Shape::from_json(&value).unwrap(), shape);

    // first declared member present in the input wins
    let both = Shape::from_json(&json!({"circle": 1.5, "square": "edge"})).unwrap();
    assert_eq!(both.kind, Some(Shape_KindOneof::Circle(1.5)));

    let owned = Shape::from_json(&json!({"owner": {"id": "e-1"}})).unwrap();
    match owned.kind {
        Some(Shape_KindOneof::Owner(entity)) => assert_eq!(entity.id, "e-1"),
        other => panic!("unexpected member: {other:?}"),
    }
}

#[test]
fn test_partial_merges_into_defaults() {
    use plain::acme::entity::{Entity, EntityPartial, Kind};

    let entity = Entity::from_partial(EntityPartial {
        id: Some("e-1".to_string()),
        kind: Some(Kind::KindPerson),
        parent: Some(Box::new(EntityPartial {
            name: Some("root".to_string()),
            ..Default::default()
        })),
        children: Some(vec![EntityPartial {
            id: Some("child".to_string()),
            ..Default::default()
        }]),
        labels: Some(HashMap::from([
            ("team".to_string(), Some("core".to_string())),
            ("skip".to_string(), None),
        ])),
        ..Default::default()
    });

    assert_eq!(entity.id, "e-1");
    assert_eq!(entity.kind, Kind::KindPerson);
    assert_eq!(entity.name, "");
    assert_eq!(entity.parent.as_ref().map(|parent| parent.name.as_str()), Some("root"));
    assert_eq!(entity.children.len(), 1);
    assert_eq!(entity.children[0].id, "child");
    assert_eq!(entity.labels.len(), 1);
    assert_eq!(entity.rank, None);

    assert_eq!(Entity::from_partial(EntityPartial::default()), Entity::default());
}

#[test]
fn test_union_partial() {
    use batching::acme::shapes::{Shape, ShapePartial, Shape_KindOneof, Shape_KindOneofPartial};

    let shape = Shape::from_partial(ShapePartial {
        kind: Some(Shape_KindOneofPartial::Circle(2.0)),
        ..Default::default()
    });
    assert_eq!(shape.kind, Some(Shape_KindOneof::Circle(2.0)));
}
