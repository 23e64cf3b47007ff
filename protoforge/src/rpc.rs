//! Transport abstraction consumed by generated clients.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use crate::error::RpcError;

/// Call metadata passed to service methods generated with a metadata
/// parameter. Keys are header names, so lookups are case-insensitive.
pub type Metadata = http::HeaderMap;

/// Moves encoded requests to a server and encoded responses back.
///
/// `service` is the fully qualified service name (`package.Service`) and
/// `method` the method name as declared in the schema. `Ctx` is the caller's
/// per-request context; clients generated without context propagation use
/// `()`.
pub trait Rpc<Ctx = ()>: Send + Sync {
    fn request<'a>(
        &'a self,
        ctx: &'a Ctx,
        service: &'a str,
        method: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, Result<Bytes, RpcError>>;

    /// Server-streaming call. Defaults to a single-item stream over
    /// [`Rpc::request`].
    fn server_stream<'a>(
        &'a self,
        ctx: &'a Ctx,
        service: &'a str,
        method: &'a str,
        data: Bytes,
    ) -> BoxStream<'a, Result<Bytes, RpcError>> {
        stream::once(self.request(ctx, service, method, data)).boxed()
    }

    /// Client- or bidi-streaming call.
    fn streaming<'a>(
        &'a self,
        _ctx: &'a Ctx,
        service: &'a str,
        method: &'a str,
        _data: BoxStream<'a, Bytes>,
    ) -> BoxStream<'a, Result<Bytes, RpcError>> {
        let message = format!("{service}/{method}: streaming requests are not supported by this transport");
        stream::once(async move { Err(RpcError::Unimplemented(message)) }).boxed()
    }
}

/// Registry of request loaders scoped to one logical call context.
///
/// Generated clients fetch loaders by identity string
/// (`package.Service.Method`), so a loader is shared by every call made with
/// the same context and never across contexts.
pub trait DataLoaders: Send + Sync {
    fn get_data_loader<T, F>(&self, identifier: &str, constructor: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T;
}

/// Default [`DataLoaders`] implementation. Create one per incoming request.
#[derive(Default)]
pub struct CallContext {
    loaders: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loaders created so far.
    pub fn loader_count(&self) -> usize {
        self.loaders.lock().len()
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaders = self.loaders.lock();
        f.debug_struct("CallContext")
            .field("loaders", &loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DataLoaders for CallContext {
    fn get_data_loader<T, F>(&self, identifier: &str, constructor: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut loaders = self.loaders.lock();
        if let Some(existing) = loaders.get(identifier) {
            match existing.clone().downcast::<T>() {
                Ok(loader) => return loader,
                Err(_) => {
                    tracing::warn!(identifier, "data loader registered with another type, replacing");
                }
            }
        }
        let loader = Arc::new(constructor());
        let erased: Arc<dyn Any + Send + Sync> = loader.clone();
        loaders.insert(identifier.to_string(), erased);
        loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaders_are_shared_per_identifier() {
        let ctx = CallContext::new();
        let a = ctx.get_data_loader("pkg.Service.Method", || 1u32);
        let b = ctx.get_data_loader("pkg.Service.Method", || 2u32);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, 1);

        let other = ctx.get_data_loader("pkg.Other.Method", || 3u32);
        assert_eq!(*other, 3);
        assert_eq!(ctx.loader_count(), 2);
    }

    #[test]
    fn contexts_do_not_share_loaders() {
        let first = CallContext::new();
        let second = CallContext::new();
        let a = first.get_data_loader("id", || String::from("a"));
        let b = second.get_data_loader("id", || String::from("b"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn metadata_lookups_ignore_case() {
        let mut metadata = Metadata::new();
        metadata.insert("x-request-id", http::HeaderValue::from_static("r-1"));
        assert_eq!(metadata.get("X-Request-Id").and_then(|v| v.to_str().ok()), Some("r-1"));
    }

    #[test]
    fn type_clash_replaces_loader() {
        let ctx = CallContext::new();
        ctx.get_data_loader("id", || 1u8);
        let replaced = ctx.get_data_loader("id", || String::from("x"));
        assert_eq!(replaced.as_str(), "x");
        assert_eq!(ctx.loader_count(), 1);
    }
}
