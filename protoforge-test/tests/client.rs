use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use protoforge::{CallContext, RpcError};
use protoforge_test::ScriptedRpc;

mod plain_client {
    use super::*;
    use protoforge_test::plain::acme::entity::{
        BatchEntityRequest, BatchEntityResponse, Entity, EntityService, EntityServiceClientImpl, GetThingRequest,
    };

    fn thing(requests: Vec<GetThingRequest>) -> Entity {
        Entity {
            id: requests[0].id.clone(),
            name: format!("thing {}", requests[0].id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unary_call() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("GetThing", thing));
        let entity = client
            .get_thing(GetThingRequest { id: "x".to_string() })
            .await
            .unwrap();
        assert_eq!(entity.id, "x");
        assert_eq!(entity.name, "thing x");

        // no context means no memoization
        client.get_thing(GetThingRequest { id: "x".to_string() }).await.unwrap();
        assert_eq!(client.rpc().calls("GetThing"), 2);
    }

    #[tokio::test]
    async fn test_call_helper_matches_trait_method() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("GetThing", thing));
        let entity = client
            .call_get_thing(GetThingRequest { id: "y".to_string() })
            .await
            .unwrap();
        assert_eq!(entity.id, "y");
    }

    #[tokio::test]
    async fn test_unknown_method_surfaces_transport_error() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new());
        let err = client.batch_entity(BatchEntityRequest::default()).await.unwrap_err();
        assert!(matches!(err, RpcError::Unimplemented(ref method) if method == "acme.EntityService/BatchEntity"));
    }

    #[tokio::test]
    async fn test_server_streaming() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("Watch", thing));
        let items: Vec<_> = client
            .watch(GetThingRequest { id: "w".to_string() })
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().id, "w");
    }

    #[tokio::test]
    async fn test_client_streaming() {
        let rpc = ScriptedRpc::new().on("Upload", |entities: Vec<Entity>| BatchEntityResponse { entities });
        let client = EntityServiceClientImpl::new(rpc);
        let uploads = ["a", "b"].map(|id| Entity {
            id: id.to_string(),
            ..Default::default()
        });
        let response = client.upload(stream::iter(uploads).boxed()).await.unwrap();
        let ids: Vec<_> = response.entities.iter().map(|entity| entity.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(client.rpc().calls("Upload"), 1);
    }
}

mod batching_client {
    use super::*;
    use protoforge_test::batching::acme::entity::{
        BatchEntityRequest, BatchEntityResponse, BatchLabelRequest, BatchLabelResponse, Entity, EntityService,
        EntityServiceClientImpl, GetThingRequest,
    };

    fn entities(requests: Vec<BatchEntityRequest>) -> BatchEntityResponse {
        BatchEntityResponse {
            entities: requests[0]
                .ids
                .iter()
                .map(|id| Entity {
                    id: id.clone(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn labels(requests: Vec<BatchLabelRequest>) -> BatchLabelResponse {
        BatchLabelResponse {
            labels: requests[0]
                .ids
                .iter()
                .filter(|id| **id != 9)
                .map(|id| (*id, format!("label-{id}")))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_batch_call() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("BatchEntity", entities));
        let ctx = CallContext::new();

        let (a, b, c) = futures::join!(
            client.get_entity(&ctx, "a".to_string()),
            client.get_entity(&ctx, "b".to_string()),
            client.get_entity(&ctx, "c".to_string()),
        );
        assert_eq!(a.unwrap().id, "a");
        assert_eq!(b.unwrap().id, "b");
        assert_eq!(c.unwrap().id, "c");
        assert_eq!(client.rpc().calls("BatchEntity"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_requested_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let rpc = ScriptedRpc::new().on("BatchEntity", move |requests: Vec<BatchEntityRequest>| {
            counter.fetch_add(requests[0].ids.len(), Ordering::SeqCst);
            entities(requests)
        });
        let client = EntityServiceClientImpl::new(rpc);
        let ctx = CallContext::new();

        let (first, second) = futures::join!(
            client.get_entity(&ctx, "a".to_string()),
            client.get_entity(&ctx, "a".to_string()),
        );
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // cached for the lifetime of the context
        client.get_entity(&ctx, "a".to_string()).await.unwrap();
        assert_eq!(client.rpc().calls("BatchEntity"), 1);
    }

    #[tokio::test]
    async fn test_keyed_batch_returns_none_for_missing_keys() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("BatchLabel", labels));
        let ctx = CallContext::new();

        let (one, missing) = futures::join!(client.get_label(&ctx, 1), client.get_label(&ctx, 9));
        assert_eq!(one.unwrap().as_deref(), Some("label-1"));
        assert_eq!(missing.unwrap(), None);
        assert_eq!(client.rpc().calls("BatchLabel"), 1);
    }

    #[tokio::test]
    async fn test_short_batch_response_fails_every_load() {
        let rpc = ScriptedRpc::new().on("BatchEntity", |_: Vec<BatchEntityRequest>| BatchEntityResponse {
            entities: vec![Entity::default()],
        });
        let client = EntityServiceClientImpl::new(rpc);
        let ctx = CallContext::new();

        let (a, b) = futures::join!(
            client.get_entity(&ctx, "a".to_string()),
            client.get_entity(&ctx, "b".to_string()),
        );
        for result in [a, b] {
            assert!(matches!(
                result,
                Err(RpcError::BatchMismatch {
                    expected: 2,
                    actual: 1
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_get_methods_are_memoized_per_context() {
        let rpc = ScriptedRpc::new().on("GetThing", |requests: Vec<GetThingRequest>| Entity {
            id: requests[0].id.clone(),
            ..Default::default()
        });
        let client = EntityServiceClientImpl::new(rpc);
        let ctx = CallContext::new();

        let first = client
            .get_thing(&ctx, GetThingRequest { id: "x".to_string() })
            .await
            .unwrap();
        let second = client
            .get_thing(&ctx, GetThingRequest { id: "x".to_string() })
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(client.rpc().calls("GetThing"), 1);

        client
            .get_thing(&ctx, GetThingRequest { id: "y".to_string() })
            .await
            .unwrap();
        assert_eq!(client.rpc().calls("GetThing"), 2);

        let other = CallContext::new();
        client
            .get_thing(&other, GetThingRequest { id: "x".to_string() })
            .await
            .unwrap();
        assert_eq!(client.rpc().calls("GetThing"), 3);
    }

    #[tokio::test]
    async fn test_contexts_do_not_share_batches() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("BatchEntity", entities));
        let first = CallContext::new();
        let second = CallContext::new();

        let (a, b) = futures::join!(
            client.get_entity(&first, "a".to_string()),
            client.get_entity(&second, "a".to_string()),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(client.rpc().calls("BatchEntity"), 2);
        assert_eq!(first.loader_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_batch_call_bypasses_loader() {
        let client = EntityServiceClientImpl::new(ScriptedRpc::new().on("BatchEntity", entities));
        let ctx = CallContext::new();
        let response = client
            .batch_entity(
                &ctx,
                BatchEntityRequest {
                    ids: vec!["a".to_string(), "b".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(response.entities.len(), 2);
        assert_eq!(ctx.loader_count(), 0);
    }
}

mod streaming_client {
    use super::*;
    use protoforge_test::strings::acme::entity::{
        BatchEntityResponse, Entity, EntityService, EntityServiceClientImpl, GetThingRequest,
    };

    #[tokio::test]
    async fn test_every_method_returns_a_stream() {
        let rpc = ScriptedRpc::new()
            .on("GetThing", |requests: Vec<GetThingRequest>| Entity {
                id: requests[0].id.clone(),
                revision: "9007199254740993".to_string(),
                ..Default::default()
            })
            .on("Upload", |entities: Vec<Entity>| BatchEntityResponse { entities });
        let client = EntityServiceClientImpl::new(rpc);

        let things: Vec<_> = client
            .GetThing(GetThingRequest { id: "s".to_string() })
            .collect()
            .await;
        assert_eq!(things.len(), 1);
        let thing = things.into_iter().next().unwrap().unwrap();
        assert_eq!(thing.id, "s");
        assert_eq!(thing.revision, "9007199254740993");

        let mut uploaded = client.Upload(stream::iter(vec![thing]).boxed());
        let response = uploaded.next().await.unwrap().unwrap();
        assert_eq!(response.entities.len(), 1);
        assert!(uploaded.next().await.is_none());
    }
}
