//! The test schemas compiled under four option sets, plus a scripted
//! transport for driving generated clients.

use std::collections::HashMap;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use protoforge::{Message, Rpc, RpcError};

/// Default options.
pub mod plain {
    include!(concat!(env!("OUT_DIR"), "/plain/protos.rs"));
}

/// Context propagation, union oneofs, native optional properties, longs as
/// JSON strings.
pub mod batching {
    include!(concat!(env!("OUT_DIR"), "/batching/protos.rs"));
}

/// Decimal-string longs, shared bytes, verbatim JSON names, method names as
/// declared, every method returning a stream.
pub mod strings {
    include!(concat!(env!("OUT_DIR"), "/strings/protos.rs"));
}

/// Server controller and client traits with a metadata parameter, configured
/// through the plugin parameter string.
pub mod controllers {
    include!(concat!(env!("OUT_DIR"), "/controllers/protos.rs"));
}

type Handler = Box<dyn Fn(Vec<Bytes>) -> Result<Bytes, RpcError> + Send + Sync>;

/// In-memory [`Rpc`] answering each method with a typed handler and counting
/// the calls it receives.
#[derive(Default)]
pub struct ScriptedRpc {
    handlers: HashMap<String, Handler>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with `handler`. Unary calls pass one request;
    /// client-streaming calls pass every request of the stream.
    pub fn on<Req, Res, F>(mut self, method: &str, handler: F) -> Self
    where
        Req: Message,
        Res: Message,
        F: Fn(Vec<Req>) -> Res + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |requests| {
            let requests = requests
                .iter()
                .map(|data| Req::decode_bytes(data))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(handler(requests).encode_to_bytes())
        });
        self.handlers.insert(method.to_string(), handler);
        self
    }

    /// Calls received for `method` so far.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or_default()
    }

    fn dispatch(&self, service: &str, method: &str, requests: Vec<Bytes>) -> Result<Bytes, RpcError> {
        *self.calls.lock().entry(method.to_string()).or_default() += 1;
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| RpcError::Unimplemented(format!("{service}/{method}")))?;
        handler(requests)
    }
}

impl std::fmt::Debug for ScriptedRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRpc")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<Ctx> Rpc<Ctx> for ScriptedRpc {
    fn request<'a>(
        &'a self,
        _ctx: &'a Ctx,
        service: &'a str,
        method: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, Result<Bytes, RpcError>> {
        futures::future::ready(self.dispatch(service, method, vec![data])).boxed()
    }

    fn streaming<'a>(
        &'a self,
        _ctx: &'a Ctx,
        service: &'a str,
        method: &'a str,
        data: BoxStream<'a, Bytes>,
    ) -> BoxStream<'a, Result<Bytes, RpcError>> {
        async move {
            let requests: Vec<Bytes> = data.collect().await;
            self.dispatch(service, method, requests)
        }
        .into_stream()
        .boxed()
    }
}
