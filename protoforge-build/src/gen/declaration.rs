use proc_macro2::{Ident, Literal, TokenStream};
use quote::quote;

use crate::comments::doc_attrs;
use crate::descriptor::{EnumDescriptor, MessageDescriptor};
use crate::types::{EnumPlan, Member, TypeMapper};

/// Struct, union enums and base instance for one message.
pub(crate) fn message(
    mapper: &TypeMapper<'_>,
    message: &MessageDescriptor,
    ident: &Ident,
    members: &[Member<'_>],
) -> TokenStream {
    let docs = mapper.comments().doc_attrs(&message.path);

    let fields = members.iter().map(|member| {
        let property = mapper.property(member);
        let docs = doc_attrs(&property.docs);
        let name = &property.ident;
        let ty = &property.ty;
        quote! {
            #docs
            pub #name: #ty,
        }
    });

    let defaults = members.iter().map(|member| {
        let name = &mapper.property(member).ident;
        let value = mapper.member_default(member);
        quote! { #name: #value, }
    });

    let unions = members.iter().filter_map(|member| match member {
        Member::Union(union) => Some(union),
        Member::Field(_) => None,
    });
    let union_decls = unions.map(|union| {
        let type_ident = &union.type_ident;
        let variants = union.variants.iter().map(|variant| {
            let docs = mapper.comments().doc_attrs(&variant.field.path);
            let name = &variant.variant;
            let ty = mapper.value_type(variant.kind, variant.boxed);
            quote! {
                #docs
                #name(#ty),
            }
        });
        quote! {
            #[allow(non_camel_case_types)]
            #[derive(Clone, Debug, PartialEq)]
            pub enum #type_ident {
                #(#variants)*
            }
        }
    });

    quote! {
        #docs
        #[allow(non_camel_case_types)]
        #[derive(Clone, Debug, PartialEq)]
        pub struct #ident {
            #(#fields)*
        }

        #(#union_decls)*

        impl ::core::default::Default for #ident {
            fn default() -> Self {
                Self {
                    #(#defaults)*
                }
            }
        }
    }
}

/// Enum declaration with its `UNRECOGNIZED` sentinel and name/number
/// conversions. `with_json` adds `from_json`/`to_json`.
pub(crate) fn enumeration(
    mapper: &TypeMapper<'_>,
    en: &EnumDescriptor,
    ident: &Ident,
    with_json: bool,
) -> TokenStream {
    let plan = EnumPlan::new(en);
    let docs = mapper.comments().doc_attrs(&en.path);
    let sentinel = &plan.sentinel;
    let sentinel_number = Literal::i32_unsuffixed(plan.sentinel_number);
    let default = &plan.default;

    let variants = plan.variants.iter().map(|(name, value)| {
        let docs = mapper.comments().doc_attrs(&value.path);
        let number = Literal::i32_unsuffixed(value.number);
        quote! {
            #docs
            #name = #number,
        }
    });
    let from_i32_arms = plan.variants.iter().map(|(name, value)| {
        let number = Literal::i32_unsuffixed(value.number);
        quote! { #number => Self::#name, }
    });
    let str_name_arms = plan.variants.iter().map(|(name, value)| {
        let text = &value.name;
        quote! { Self::#name => #text, }
    });

    let json = with_json.then(|| {
        let name_arms = plan.variants.iter().map(|(variant, _)| {
            let names = plan
                .names
                .iter()
                .filter(|(_, target)| target == variant)
                .map(|(name, _)| *name);
            quote! { #(#names)|* => Self::#variant, }
        });
        let to_json_arms = plan.variants.iter().map(|(name, value)| {
            let text = &value.name;
            quote! { Self::#name => #text, }
        });
        quote! {
            /// Accepts the value name (aliases included) or its number.
            pub fn from_json(value: &::protoforge::serde_json::Value) -> Self {
                match value {
                    ::protoforge::serde_json::Value::Number(number) => number
                        .as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .map_or(Self::#sentinel, Self::from_i32),
                    ::protoforge::serde_json::Value::String(name) => match name.as_str() {
                        #(#name_arms)*
                        _ => Self::#sentinel,
                    },
                    _ => Self::#sentinel,
                }
            }

            pub fn to_json(&self) -> &'static str {
                match self {
                    #(#to_json_arms)*
                    Self::#sentinel => "UNKNOWN",
                }
            }
        }
    });

    quote! {
        #docs
        #[allow(non_camel_case_types)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum #ident {
            #(#variants)*
            #sentinel = #sentinel_number,
        }

        impl #ident {
            pub fn from_i32(value: i32) -> Self {
                match value {
                    #(#from_i32_arms)*
                    _ => Self::#sentinel,
                }
            }

            pub fn as_str_name(&self) -> &'static str {
                match self {
                    #(#str_name_arms)*
                    Self::#sentinel => "UNRECOGNIZED",
                }
            }

            #json
        }

        impl ::core::default::Default for #ident {
            fn default() -> Self {
                Self::#default
            }
        }
    }
}
