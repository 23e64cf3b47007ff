use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

use crate::types::{FieldPlan, Layout, Member, TypeMapper, ValueKind};

/// Type of one value inside a partial: messages become their partials.
fn partial_value_type(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, boxed: bool) -> TokenStream {
    match kind {
        ValueKind::Message(entry) => {
            let path = mapper.partial_path(entry);
            if boxed {
                quote!(::std::boxed::Box<#path>)
            } else {
                path
            }
        }
        other => {
            let ty = mapper.value_type(other, false);
            quote!(#ty)
        }
    }
}

/// Convert a partial value bound to `value` into the full value.
fn merge_value(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, boxed: bool) -> TokenStream {
    match kind {
        ValueKind::Message(entry) => {
            let path = mapper.type_path(entry);
            if boxed {
                quote!(::std::boxed::Box::new(<#path as ::protoforge::FromPartial>::from_partial(*value)))
            } else {
                quote!(<#path as ::protoforge::FromPartial>::from_partial(value))
            }
        }
        _ => quote!(value),
    }
}

fn partial_field_type(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let value = partial_value_type(mapper, plan.kind, plan.boxed);
    let ty = match &plan.layout {
        Layout::Plain | Layout::Optional => value,
        Layout::Repeated => quote!(::std::vec::Vec<#value>),
        Layout::Map(map) => {
            let key = mapper.value_type(map.key.kind, false);
            let value = partial_value_type(mapper, map.value.kind, false);
            quote!(::std::collections::HashMap<#key, ::core::option::Option<#value>>)
        }
    };
    quote!(::core::option::Option<#ty>)
}

fn merge_field(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let name = &plan.ident;
    let body = match &plan.layout {
        Layout::Plain => {
            let value = merge_value(mapper, plan.kind, plan.boxed);
            quote!(message.#name = #value;)
        }
        Layout::Optional => {
            let value = merge_value(mapper, plan.kind, plan.boxed);
            quote!(message.#name = ::core::option::Option::Some(#value);)
        }
        Layout::Repeated => match plan.kind {
            ValueKind::Message(_) => {
                let value = merge_value(mapper, plan.kind, false);
                quote!(message.#name = value.into_iter().map(|value| #value).collect();)
            }
            _ => quote!(message.#name = value;),
        },
        Layout::Map(map) => {
            let value = merge_value(mapper, map.value.kind, false);
            quote! {
                for (key, value) in value {
                    if let ::core::option::Option::Some(value) = value {
                        message.#name.insert(key, #value);
                    }
                }
            }
        }
    };
    quote! {
        if let ::core::option::Option::Some(value) = object.#name {
            #body
        }
    }
}

/// `{Name}Partial` and `impl protoforge::FromPartial` for one message.
pub(crate) fn message_partial(mapper: &TypeMapper<'_>, ident: &Ident, members: &[Member<'_>]) -> TokenStream {
    let partial_ident = format_ident!("{}Partial", ident);
    let mut fields = Vec::new();
    let mut merges = Vec::new();
    let mut unions = Vec::new();

    for member in members {
        match member {
            Member::Field(plan) => {
                let name = &plan.ident;
                let ty = partial_field_type(mapper, plan);
                fields.push(quote!(pub #name: #ty,));
                merges.push(merge_field(mapper, plan));
            }
            Member::Union(union) => {
                let name = &union.ident;
                let type_ident = &union.type_ident;
                let partial_union = format_ident!("{}Partial", type_ident);
                let variants = union.variants.iter().map(|variant| {
                    let case = &variant.variant;
                    let ty = partial_value_type(mapper, variant.kind, variant.boxed);
                    quote!(#case(#ty),)
                });
                unions.push(quote! {
                    #[allow(non_camel_case_types)]
                    #[derive(Clone, Debug, PartialEq)]
                    pub enum #partial_union {
                        #(#variants)*
                    }
                });
                fields.push(quote!(pub #name: ::core::option::Option<#partial_union>,));

                let arms = union.variants.iter().map(|variant| {
                    let case = &variant.variant;
                    let value = merge_value(mapper, variant.kind, variant.boxed);
                    quote!(#partial_union::#case(value) => #type_ident::#case(#value),)
                });
                merges.push(quote! {
                    if let ::core::option::Option::Some(value) = object.#name {
                        message.#name = ::core::option::Option::Some(match value {
                            #(#arms)*
                        });
                    }
                });
            }
        }
    }

    quote! {
        #[allow(non_camel_case_types)]
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct #partial_ident {
            #(#fields)*
        }

        #(#unions)*

        impl ::protoforge::FromPartial for #ident {
            type Partial = #partial_ident;

            #[allow(unused_mut, unused_variables)]
            fn from_partial(object: DeepPartial<Self>) -> Self {
                let mut message = Self::default();
                #(#merges)*
                message
            }
        }
    }
}
