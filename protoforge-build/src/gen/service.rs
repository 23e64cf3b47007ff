use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

use crate::descriptor::{FileUnit, MethodDescriptor, ServiceDescriptor};
use crate::error::Result;
use crate::naming::{constant_case, field_ident, rust_ident, singular, snake_case};
use crate::options::{GenerationOptions, ServiceMethodCasing, StreamingReturnStyle};
use crate::types::{FieldPlan, GeneratedType, Layout, TypeMapper, ValueKind};

/// Per-method facts shared by the trait and client generators.
pub(crate) struct MethodInfo<'a> {
    pub method: &'a MethodDescriptor,
    pub ident: Ident,
    pub input: TokenStream,
    pub output: TokenStream,
    pub docs: TokenStream,
    /// `Get[A-Z]…` unary method wrapped in a per-context request cache.
    pub memoized: bool,
}

impl MethodInfo<'_> {
    pub fn is_unary(&self) -> bool {
        !self.method.client_streaming && !self.method.server_streaming
    }
}

/// A `Batch<X>` method paired with a synthesized `Get<X>` accessor.
pub(crate) struct BatchPlan {
    pub method_ident: Ident,
    pub accessor: Ident,
    /// `{package}.{Service}.{Method}`, the loader identity.
    pub identity: String,
    pub param: Ident,
    pub input: TokenStream,
    pub input_field: Ident,
    pub output_field: Ident,
    pub key_type: GeneratedType,
    pub value_type: GeneratedType,
    /// The batch response is keyed by item rather than positional.
    pub keyed: bool,
}

impl BatchPlan {
    /// Type the accessor resolves to.
    pub fn accessor_output(&self) -> TokenStream {
        let value = &self.value_type;
        if self.keyed {
            quote!(::core::option::Option<#value>)
        } else {
            quote!(#value)
        }
    }
}

pub(crate) struct ServiceInfo<'a> {
    pub service: &'a ServiceDescriptor,
    pub ident: Ident,
    /// `{package}.{Service}` as sent to the transport.
    pub full_name: String,
    pub methods: Vec<MethodInfo<'a>>,
    pub batches: Vec<BatchPlan>,
}

pub(crate) fn method_ident(name: &str, casing: ServiceMethodCasing) -> Ident {
    match casing {
        ServiceMethodCasing::ForceLowerFirst => rust_ident(&snake_case(name)),
        ServiceMethodCasing::AsDeclared => rust_ident(name),
    }
}

fn is_get_method(name: &str) -> bool {
    name.strip_prefix("Get")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// The sole field of `message_name` when it is repeated.
fn sole_repeated_field<'a>(mapper: &TypeMapper<'a>, message_name: &str, referenced_by: &str) -> Result<Option<FieldPlan<'a>>> {
    let entry = mapper.registry().resolve(message_name, referenced_by)?;
    let Some(message) = entry.message() else {
        return Ok(None);
    };
    match message.fields.as_slice() {
        [field] if field.is_repeated() => Ok(Some(mapper.plan_field(field, &entry.qualified_name)?)),
        _ => Ok(None),
    }
}

fn hashable(kind: ValueKind<'_>) -> bool {
    match kind {
        ValueKind::Scalar(scalar) => !scalar.is_float(),
        ValueKind::Enum(_) => true,
        _ => false,
    }
}

fn detect_batch(
    mapper: &TypeMapper<'_>,
    service: &ServiceDescriptor,
    full_name: &str,
    method: &MethodDescriptor,
) -> Result<Option<BatchPlan>> {
    let Some(item) = method.name.strip_prefix("Batch") else {
        return Ok(None);
    };
    if item.is_empty() || method.client_streaming || method.server_streaming {
        return Ok(None);
    }
    let referenced_by = format!("{full_name}.{}", method.name);
    let Some(input) = sole_repeated_field(mapper, &method.input_type, &referenced_by)? else {
        return Ok(None);
    };
    let Some(output) = sole_repeated_field(mapper, &method.output_type, &referenced_by)? else {
        return Ok(None);
    };
    if !matches!(input.layout, Layout::Repeated) || !hashable(input.kind) {
        tracing::debug!(method = %referenced_by, "batch input items are not usable as cache keys");
        return Ok(None);
    }

    let key_type = mapper.value_type(input.kind, false);
    let (value_type, keyed) = match &output.layout {
        Layout::Map(map) => {
            let map_key = mapper.value_type(map.key.kind, false);
            if quote!(#map_key).to_string() != quote!(#key_type).to_string() {
                tracing::debug!(method = %referenced_by, "batch map keys differ from request items");
                return Ok(None);
            }
            (mapper.value_type(map.value.kind, false), true)
        }
        _ => (mapper.value_type(output.kind, output.boxed), false),
    };

    let accessor_name = format!("Get{item}");
    if service.methods.iter().any(|m| m.name == accessor_name) {
        tracing::debug!(
            method = %referenced_by,
            accessor = %accessor_name,
            "service already declares the batch accessor"
        );
        return Ok(None);
    }

    let input_entry = mapper.registry().resolve(&method.input_type, &referenced_by)?;
    let casing = mapper.options().service_method_casing;
    Ok(Some(BatchPlan {
        method_ident: method_ident(&method.name, casing),
        accessor: method_ident(&accessor_name, casing),
        identity: format!("{full_name}.{}", method.name),
        param: field_ident(singular(&input.field.name)),
        input: mapper.type_path(input_entry),
        input_field: input.ident.clone(),
        output_field: output.ident.clone(),
        key_type,
        value_type,
        keyed,
    }))
}

pub(crate) fn service_info<'a>(
    mapper: &TypeMapper<'a>,
    file: &FileUnit,
    service: &'a ServiceDescriptor,
) -> Result<ServiceInfo<'a>> {
    let full_name = if file.package.is_empty() {
        service.name.clone()
    } else {
        format!("{}.{}", file.package, service.name)
    };
    let context = mapper.options().context_propagation;
    let casing = mapper.options().service_method_casing;

    let mut methods = Vec::with_capacity(service.methods.len());
    let mut batches = Vec::new();
    for method in &service.methods {
        let referenced_by = format!("{full_name}.{}", method.name);
        let input = mapper.registry().resolve(&method.input_type, &referenced_by)?;
        let output = mapper.registry().resolve(&method.output_type, &referenced_by)?;
        let unary = !method.client_streaming && !method.server_streaming;
        methods.push(MethodInfo {
            method,
            ident: method_ident(&method.name, casing),
            input: mapper.type_path(input),
            output: mapper.type_path(output),
            docs: mapper.comments().doc_attrs(&method.path),
            memoized: context && unary && is_get_method(&method.name),
        });
        if context && let Some(batch) = detect_batch(mapper, service, &full_name, method)? {
            tracing::debug!(identity = %batch.identity, "batch accessor synthesized");
            batches.push(batch);
        }
    }

    Ok(ServiceInfo {
        service,
        ident: rust_ident(&service.name),
        full_name,
        methods,
        batches,
    })
}

/// Request parameter type of `method`.
pub(crate) fn request_type(info: &MethodInfo<'_>) -> TokenStream {
    let input = &info.input;
    if info.method.client_streaming {
        quote!(::protoforge::BoxStream<'a, #input>)
    } else {
        quote!(#input)
    }
}

/// Whether `method` returns a stream under the configured style.
pub(crate) fn returns_stream(info: &MethodInfo<'_>, style: StreamingReturnStyle) -> bool {
    info.method.server_streaming || style == StreamingReturnStyle::ReactiveStream
}

pub(crate) fn return_type(info: &MethodInfo<'_>, style: StreamingReturnStyle) -> TokenStream {
    let output = &info.output;
    if returns_stream(info, style) {
        quote!(::protoforge::BoxStream<'a, ::core::result::Result<#output, ::protoforge::RpcError>>)
    } else {
        quote!(::protoforge::BoxFuture<'a, ::core::result::Result<#output, ::protoforge::RpcError>>)
    }
}

/// `ctx: &'a Ctx,` when context propagation is on.
pub(crate) fn ctx_param(context: bool) -> TokenStream {
    if context {
        quote!(ctx: &'a Ctx,)
    } else {
        TokenStream::new()
    }
}

pub(crate) fn accessor_signature(batch: &BatchPlan) -> TokenStream {
    let accessor = &batch.accessor;
    let param = &batch.param;
    let key = &batch.key_type;
    let output = batch.accessor_output();
    quote! {
        fn #accessor<'a>(
            &'a self,
            ctx: &'a Ctx,
            #param: #key,
        ) -> ::protoforge::BoxFuture<'a, ::core::result::Result<#output, ::protoforge::RpcError>>
    }
}

/// `metadata: Option<&'a Metadata>,` when the metadata parameter is on.
pub(crate) fn metadata_param(options: &GenerationOptions) -> TokenStream {
    if options.metadata_parameter {
        quote!(metadata: ::core::option::Option<&'a ::protoforge::Metadata>,)
    } else {
        TokenStream::new()
    }
}

const EMPTY: &str = ".google.protobuf.Empty";

/// Which service trait is being declared.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Surface {
    /// `{Service}`, implemented by the generated client.
    Call,
    /// `{Service}Controller`, implemented by servers.
    Controller,
    /// `{Service}Client`: every method answers with a stream.
    Client,
}

fn surface_return(info: &MethodInfo<'_>, style: StreamingReturnStyle, surface: Surface) -> TokenStream {
    match surface {
        Surface::Client => return_type(info, StreamingReturnStyle::ReactiveStream),
        Surface::Controller if info.method.output_type == EMPTY && !returns_stream(info, style) => {
            quote!(::protoforge::BoxFuture<'a, ::core::result::Result<(), ::protoforge::RpcError>>)
        }
        _ => return_type(info, style),
    }
}

fn surface_trait(mapper: &TypeMapper<'_>, info: &ServiceInfo<'_>, ident: &Ident, surface: Surface) -> TokenStream {
    let options = mapper.options();
    let context = options.context_propagation;
    let docs = mapper.comments().doc_attrs(&info.service.path);
    let ctx = ctx_param(context);
    let metadata = metadata_param(options);

    let methods = info.methods.iter().map(|method| {
        let docs = &method.docs;
        let name = &method.ident;
        let request = request_type(method);
        let response = surface_return(method, options.streaming_return_style, surface);
        quote! {
            #docs
            fn #name<'a>(&'a self, #ctx request: #request, #metadata) -> #response;
        }
    });

    let accessors = info.batches.iter().map(|batch| {
        let doc = format!(
            " Loads one item through `{}`, coalescing concurrent calls made with the same context.",
            batch.method_ident
        );
        let signature = accessor_signature(batch);
        quote! {
            #[doc = #doc]
            #signature;
        }
    });

    let generics = if context {
        quote!(<Ctx: ::protoforge::DataLoaders>)
    } else {
        TokenStream::new()
    };
    let casing = (options.service_method_casing == ServiceMethodCasing::AsDeclared)
        .then(|| quote!(#[allow(non_snake_case)]));

    quote! {
        #docs
        #casing
        pub trait #ident #generics: Send + Sync {
            #(#methods)*
            #(#accessors)*
        }
    }
}

/// The call-surface trait for one service.
pub(crate) fn service_trait(mapper: &TypeMapper<'_>, info: &ServiceInfo<'_>) -> TokenStream {
    surface_trait(mapper, info, &info.ident, Surface::Call)
}

/// `{PACKAGE}_PACKAGE_NAME`, emitted once per file in controller mode.
pub(crate) fn package_name_const(file: &FileUnit) -> TokenStream {
    let ident = format_ident!("{}_PACKAGE_NAME", constant_case(&file.package));
    let package = &file.package;
    quote! {
        pub const #ident: &str = #package;
    }
}

/// `ENTITY_SERVICE_NAME` for `EntityService`, `GREETER_SERVICE_NAME` for
/// `Greeter`.
fn service_name_ident(service: &str) -> Ident {
    let base = constant_case(service);
    if service.to_ascii_lowercase().ends_with("service") {
        format_ident!("{base}_NAME")
    } else {
        format_ident!("{base}_SERVICE_NAME")
    }
}

/// Server-side declarations for one service: the `{Service}Controller` and
/// `{Service}Client` traits, the service name, and the schema names of its
/// methods split by whether the request is streamed.
pub(crate) fn controller_items(mapper: &TypeMapper<'_>, info: &ServiceInfo<'_>) -> TokenStream {
    let controller = surface_trait(
        mapper,
        info,
        &format_ident!("{}Controller", info.service.name),
        Surface::Controller,
    );
    let client = surface_trait(mapper, info, &format_ident!("{}Client", info.service.name), Surface::Client);

    let name_ident = service_name_ident(&info.service.name);
    let service_name = &info.service.name;
    let prefix = constant_case(&info.service.name);
    let unary_ident = format_ident!("{prefix}_CONTROLLER_METHODS");
    let stream_ident = format_ident!("{prefix}_CONTROLLER_STREAM_METHODS");
    let (streamed, unary): (Vec<_>, Vec<_>) = info
        .methods
        .iter()
        .partition(|method| method.method.client_streaming);
    let unary = unary.iter().map(|method| &method.method.name);
    let streamed = streamed.iter().map(|method| &method.method.name);

    quote! {
        #controller
        #client

        pub const #name_ident: &str = #service_name;
        /// Methods whose request is a single message.
        pub const #unary_ident: &[&str] = &[#(#unary),*];
        /// Methods whose request is a stream.
        pub const #stream_ident: &[&str] = &[#(#streamed),*];
    }
}

/// The `{Service}ClientImpl` type name.
pub(crate) fn client_ident(info: &ServiceInfo<'_>) -> Ident {
    format_ident!("{}ClientImpl", info.service.name)
}
