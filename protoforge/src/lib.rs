//! Runtime support for code generated by `protoforge-build`.
//!
//! Generated modules only reference items through `::protoforge::...` paths,
//! so this crate re-exports the third-party types that appear in generated
//! signatures.
//!
//! ## Modules
//!
//! - [`error`]: Decode, JSON and RPC error types
//! - [`wire`]: Protobuf wire-format [`Reader`] and [`Writer`]
//! - [`message`]: The [`Message`], [`JsonMessage`] and [`FromPartial`] traits
//! - [`json`]: Canonical JSON coercions used by generated `from_json`/`to_json`
//! - [`wkt`]: Well-known types (`Timestamp`, wrapper values)
//! - [`rpc`]: The transport trait and per-call-context loader registry
//! - [`loader`]: Request coalescing for batched and memoized calls

mod error;
pub mod json;
mod loader;
mod message;
mod rpc;
mod wire;
pub mod wkt;

pub use error::*;
pub use loader::*;
pub use message::*;
pub use rpc::*;
pub use wire::*;

pub use base64;
pub use bytes;
pub use chrono;
pub use futures;
pub use http;
pub use serde_json;

pub use futures::future::BoxFuture;
pub use futures::stream::BoxStream;
