use proc_macro2::TokenStream;
use quote::{format_ident, quote};

use super::service::{
    BatchPlan, MethodInfo, ServiceInfo, accessor_signature, client_ident, ctx_param, request_type,
    return_type,
};
use crate::options::{ServiceMethodCasing, StreamingReturnStyle};
use crate::types::TypeMapper;

/// `ctx` or `&()` as the transport context argument.
fn ctx_arg(context: bool) -> TokenStream {
    if context { quote!(ctx) } else { quote!(&()) }
}

/// Inherent `call_<method>` helper for one unary method.
fn call_helper(info: &ServiceInfo<'_>, method: &MethodInfo<'_>, context: bool) -> TokenStream {
    let call = format_ident!("call_{}", method.ident.to_string().trim_start_matches("r#"));
    let input = &method.input;
    let output = &method.output;
    let service = &info.full_name;
    let name = &method.method.name;
    let doc = format!(" Calls `{service}/{name}` directly.");
    let ctx = ctx_arg(context);
    let (generics, ctx_param, bound) = if context {
        (quote!(<Ctx: Sync>), quote!(ctx: &Ctx,), quote!(R: ::protoforge::Rpc<Ctx>))
    } else {
        (TokenStream::new(), TokenStream::new(), quote!(R: ::protoforge::Rpc))
    };
    quote! {
        #[doc = #doc]
        pub async fn #call #generics(
            &self,
            #ctx_param
            request: #input,
        ) -> ::core::result::Result<#output, ::protoforge::RpcError>
        where
            #bound,
        {
            let data = ::protoforge::Message::encode_to_bytes(&request);
            let response = self.rpc.request(#ctx, #service, #name, data).await?;
            ::core::result::Result::Ok(<#output as ::protoforge::Message>::decode_bytes(&response)?)
        }
    }
}

/// Wrap a future of `Result<Out, RpcError>` in the configured return shape.
fn unary_return(future: TokenStream, style: StreamingReturnStyle) -> TokenStream {
    match style {
        StreamingReturnStyle::PromiseLike => quote!(::std::boxed::Box::pin(#future)),
        StreamingReturnStyle::ReactiveStream => quote! {
            ::protoforge::futures::StreamExt::boxed(::protoforge::futures::stream::once(#future))
        },
    }
}

fn method_body(info: &ServiceInfo<'_>, method: &MethodInfo<'_>, context: bool, style: StreamingReturnStyle) -> TokenStream {
    let service = &info.full_name;
    let name = &method.method.name;
    let output = &method.output;
    let ctx = ctx_arg(context);
    let decode = quote! {
        |item| item.and_then(|bytes| {
            <#output as ::protoforge::Message>::decode_bytes(&bytes).map_err(::protoforge::RpcError::from)
        })
    };

    if method.method.client_streaming {
        let requests = quote! {
            let requests = ::protoforge::futures::StreamExt::boxed(::protoforge::futures::StreamExt::map(
                request,
                |message| ::protoforge::Message::encode_to_bytes(&message),
            ));
        };
        if method.method.server_streaming {
            return quote! {
                #requests
                let responses = self.rpc.streaming(#ctx, #service, #name, requests);
                ::protoforge::futures::StreamExt::boxed(::protoforge::futures::StreamExt::map(responses, #decode))
            };
        }
        let closed = format!("{service}/{name}: stream closed without a response");
        let future = quote! {
            async move {
                let mut responses = self.rpc.streaming(#ctx, #service, #name, requests);
                match ::protoforge::futures::StreamExt::next(&mut responses).await {
                    ::core::option::Option::Some(item) => {
                        let response = item?;
                        ::core::result::Result::<_, ::protoforge::RpcError>::Ok(
                            <#output as ::protoforge::Message>::decode_bytes(&response)?,
                        )
                    }
                    ::core::option::Option::None => {
                        ::core::result::Result::Err(::protoforge::RpcError::transport(#closed))
                    }
                }
            }
        };
        let wrapped = unary_return(future, style);
        return quote! {
            #requests
            #wrapped
        };
    }

    if method.method.server_streaming {
        return quote! {
            let data = ::protoforge::Message::encode_to_bytes(&request);
            let responses = self.rpc.server_stream(#ctx, #service, #name, data);
            ::protoforge::futures::StreamExt::boxed(::protoforge::futures::StreamExt::map(responses, #decode))
        };
    }

    if method.memoized {
        let identity = format!("{service}.{name}");
        let future = quote! {
            async move {
                let loader = ctx.get_data_loader(
                    #identity,
                    ::protoforge::BatchLoader::<::protoforge::bytes::Bytes, #output>::new,
                );
                let key = ::protoforge::Message::encode_to_bytes(&request);
                loader
                    .load(key, move |requests| async move {
                        ::protoforge::futures::future::try_join_all(requests.into_iter().map(move |data| async move {
                            let response = self.rpc.request(ctx, #service, #name, data).await?;
                            ::core::result::Result::<_, ::protoforge::RpcError>::Ok(
                                <#output as ::protoforge::Message>::decode_bytes(&response)?,
                            )
                        }))
                        .await
                    })
                    .await
            }
        };
        return unary_return(future, style);
    }

    let call = format_ident!("call_{}", method.ident.to_string().trim_start_matches("r#"));
    let ctx_call = if context { quote!(ctx,) } else { TokenStream::new() };
    unary_return(quote!(self.#call(#ctx_call request)), style)
}

fn accessor_body(batch: &BatchPlan) -> TokenStream {
    let identity = &batch.identity;
    let param = &batch.param;
    let key = &batch.key_type;
    let input = &batch.input;
    let input_field = &batch.input_field;
    let output_field = &batch.output_field;
    let call = format_ident!("call_{}", batch.method_ident.to_string().trim_start_matches("r#"));
    let stored = batch.accessor_output();

    let batch_fn = if batch.keyed {
        quote! {
            move |#input_field: ::std::vec::Vec<#key>| async move {
                let request = #input { #input_field: #input_field.clone() };
                let response = self.#call(ctx, request).await?;
                ::core::result::Result::<_, ::protoforge::RpcError>::Ok(
                    #input_field
                        .iter()
                        .map(|key| response.#output_field.get(key).cloned())
                        .collect(),
                )
            }
        }
    } else {
        quote! {
            move |#input_field: ::std::vec::Vec<#key>| async move {
                let response = self.#call(ctx, #input { #input_field }).await?;
                ::core::result::Result::<_, ::protoforge::RpcError>::Ok(response.#output_field)
            }
        }
    };

    quote! {
        ::std::boxed::Box::pin(async move {
            let loader = ctx.get_data_loader(#identity, ::protoforge::BatchLoader::<#key, #stored>::new);
            loader.load(#param, #batch_fn).await
        })
    }
}

/// `{Service}ClientImpl` implementing the service trait over an injected
/// [`Rpc`](protoforge::Rpc) transport.
pub(crate) fn client_impl(mapper: &TypeMapper<'_>, info: &ServiceInfo<'_>) -> TokenStream {
    let options = mapper.options();
    let context = options.context_propagation;
    let style = options.streaming_return_style;
    let trait_ident = &info.ident;
    let client = client_ident(info);
    let ctx = ctx_param(context);

    let helpers = info
        .methods
        .iter()
        .filter(|m| m.is_unary())
        .map(|m| call_helper(info, m, context));

    let methods = info.methods.iter().map(|method| {
        let name = &method.ident;
        let request = request_type(method);
        let response = return_type(method, style);
        let body = method_body(info, method, context, style);
        quote! {
            fn #name<'a>(&'a self, #ctx request: #request) -> #response {
                #body
            }
        }
    });

    let accessors = info.batches.iter().map(|batch| {
        let signature = accessor_signature(batch);
        let body = accessor_body(batch);
        quote! {
            #signature {
                #body
            }
        }
    });

    let casing = (options.service_method_casing == ServiceMethodCasing::AsDeclared)
        .then(|| quote!(#[allow(non_snake_case)]));
    let doc = format!(" Client for [`{trait_ident}`] over an injected transport.");
    let trait_impl = if context {
        quote! {
            impl<Ctx, R> #trait_ident<Ctx> for #client<R>
            where
                Ctx: ::protoforge::DataLoaders,
                R: ::protoforge::Rpc<Ctx>,
        }
    } else {
        quote! {
            impl<R> #trait_ident for #client<R>
            where
                R: ::protoforge::Rpc,
        }
    };

    quote! {
        #[doc = #doc]
        #[derive(Clone, Debug)]
        pub struct #client<R> {
            rpc: R,
        }

        #casing
        impl<R> #client<R> {
            pub fn new(rpc: R) -> Self {
                Self { rpc }
            }

            pub fn rpc(&self) -> &R {
                &self.rpc
            }

            #(#helpers)*
        }

        #casing
        #trait_impl
        {
            #(#methods)*
            #(#accessors)*
        }
    }
}
