use futures::stream::{self, StreamExt};
use protoforge::http::HeaderValue;
use protoforge::{BoxFuture, BoxStream, Metadata, RpcError};
use protoforge_test::controllers::acme::entity::{
    ACME_PACKAGE_NAME, BatchEntityRequest, BatchEntityResponse, BatchLabelRequest, BatchLabelResponse,
    ENTITY_SERVICE_CONTROLLER_METHODS, ENTITY_SERVICE_CONTROLLER_STREAM_METHODS, ENTITY_SERVICE_NAME, Entity,
    EntityServiceClient, EntityServiceController, GetThingRequest,
};

struct Directory;

fn caller(metadata: Option<&Metadata>) -> String {
    metadata
        .and_then(|metadata| metadata.get("x-caller"))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

impl EntityServiceController for Directory {
    fn batch_entity<'a>(
        &'a self,
        request: BatchEntityRequest,
        _metadata: Option<&'a Metadata>,
    ) -> BoxFuture<'a, Result<BatchEntityResponse, RpcError>> {
        Box::pin(async move {
            let entities = request
                .ids
                .into_iter()
                .map(|id| Entity {
                    id,
                    ..Default::default()
                })
                .collect();
            Ok(BatchEntityResponse { entities })
        })
    }

    fn batch_label<'a>(
        &'a self,
        _request: BatchLabelRequest,
        _metadata: Option<&'a Metadata>,
    ) -> BoxFuture<'a, Result<BatchLabelResponse, RpcError>> {
        Box::pin(async { Err(RpcError::Unimplemented("acme.EntityService/BatchLabel".to_string())) })
    }

    fn get_thing<'a>(
        &'a self,
        request: GetThingRequest,
        metadata: Option<&'a Metadata>,
    ) -> BoxFuture<'a, Result<Entity, RpcError>> {
        let name = caller(metadata);
        Box::pin(async move {
            Ok(Entity {
                id: request.id,
                name,
                ..Default::default()
            })
        })
    }

    fn watch<'a>(
        &'a self,
        request: GetThingRequest,
        _metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<Entity, RpcError>> {
        stream::iter(1..=2)
            .map(move |n| {
                Ok(Entity {
                    id: format!("{}-{n}", request.id),
                    ..Default::default()
                })
            })
            .boxed()
    }

    fn upload<'a>(
        &'a self,
        request: BoxStream<'a, Entity>,
        _metadata: Option<&'a Metadata>,
    ) -> BoxFuture<'a, Result<BatchEntityResponse, RpcError>> {
        Box::pin(async move {
            Ok(BatchEntityResponse {
                entities: request.collect().await,
            })
        })
    }
}

/// Serves the stream-only client surface straight from a controller.
struct InProcess<C>(C);

impl<C: EntityServiceController> EntityServiceClient for InProcess<C> {
    fn batch_entity<'a>(
        &'a self,
        request: BatchEntityRequest,
        metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<BatchEntityResponse, RpcError>> {
        stream::once(self.0.batch_entity(request, metadata)).boxed()
    }

    fn batch_label<'a>(
        &'a self,
        request: BatchLabelRequest,
        metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<BatchLabelResponse, RpcError>> {
        stream::once(self.0.batch_label(request, metadata)).boxed()
    }

    fn get_thing<'a>(
        &'a self,
        request: GetThingRequest,
        metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<Entity, RpcError>> {
        stream::once(self.0.get_thing(request, metadata)).boxed()
    }

    fn watch<'a>(
        &'a self,
        request: GetThingRequest,
        metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<Entity, RpcError>> {
        self.0.watch(request, metadata)
    }

    fn upload<'a>(
        &'a self,
        request: BoxStream<'a, Entity>,
        metadata: Option<&'a Metadata>,
    ) -> BoxStream<'a, Result<BatchEntityResponse, RpcError>> {
        stream::once(self.0.upload(request, metadata)).boxed()
    }
}

#[test]
fn test_name_constants() {
    assert_eq!(ACME_PACKAGE_NAME, "acme");
    assert_eq!(ENTITY_SERVICE_NAME, "EntityService");
    assert_eq!(
        ENTITY_SERVICE_CONTROLLER_METHODS,
        ["BatchEntity", "BatchLabel", "GetThing", "Watch"]
    );
    assert_eq!(ENTITY_SERVICE_CONTROLLER_STREAM_METHODS, ["Upload"]);
}

#[tokio::test]
async fn test_controller_receives_metadata() {
    let mut metadata = Metadata::new();
    metadata.insert("x-caller", HeaderValue::from_static("ada"));

    let entity = Directory
        .get_thing(GetThingRequest { id: "e-1".to_string() }, Some(&metadata))
        .await
        .unwrap();
    assert_eq!(entity.id, "e-1");
    assert_eq!(entity.name, "ada");

    let entity = Directory
        .get_thing(GetThingRequest { id: "e-2".to_string() }, None)
        .await
        .unwrap();
    assert_eq!(entity.name, "anonymous");
}

#[tokio::test]
async fn test_controller_streams() {
    let watched: Vec<_> = Directory
        .watch(GetThingRequest { id: "w".to_string() }, None)
        .map(|item| item.unwrap().id)
        .collect()
        .await;
    assert_eq!(watched, ["w-1", "w-2"]);

    let uploads = ["a", "b"].map(|id| Entity {
        id: id.to_string(),
        ..Default::default()
    });
    let response = Directory.upload(stream::iter(uploads).boxed(), None).await.unwrap();
    assert_eq!(response.entities.len(), 2);
}

#[tokio::test]
async fn test_client_surface_is_stream_only() {
    let client = InProcess(Directory);

    let batch: Vec<_> = client
        .batch_entity(
            BatchEntityRequest {
                ids: vec!["a".to_string(), "b".to_string()],
            },
            None,
        )
        .collect()
        .await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].as_ref().unwrap().entities.len(), 2);

    let mut labels = client.batch_label(BatchLabelRequest::default(), None);
    assert!(matches!(labels.next().await, Some(Err(RpcError::Unimplemented(_)))));
    assert!(labels.next().await.is_none());
}
