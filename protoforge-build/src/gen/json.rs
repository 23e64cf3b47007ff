use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

use crate::descriptor::ScalarType;
use crate::options::LongRepresentation;
use crate::types::{FieldPlan, Layout, Member, TypeMapper, ValueKind};

enum Val {
    Place(TokenStream),
    Ref(Ident),
}

impl Val {
    fn receiver(&self) -> TokenStream {
        match self {
            Val::Place(place) => place.clone(),
            Val::Ref(ident) => quote!(#ident),
        }
    }

    fn copied(&self) -> TokenStream {
        match self {
            Val::Place(place) => place.clone(),
            Val::Ref(ident) => quote!(*#ident),
        }
    }

    fn borrowed(&self) -> TokenStream {
        match self {
            Val::Place(place) => quote!(&#place),
            Val::Ref(ident) => quote!(#ident),
        }
    }
}

fn scalar_to_json(scalar: ScalarType, longs: LongRepresentation, value: &Val) -> TokenStream {
    let receiver = value.receiver();
    match scalar {
        ScalarType::String => quote!(::protoforge::serde_json::Value::String(#receiver.clone())),
        ScalarType::Bytes => {
            let value = value.borrowed();
            quote!(::protoforge::serde_json::Value::String(base64_from_bytes(#value)))
        }
        ScalarType::Bool => {
            let value = value.copied();
            quote!(::protoforge::serde_json::Value::Bool(#value))
        }
        ScalarType::Double => {
            let value = value.copied();
            quote!(::protoforge::json::from_f64(#value))
        }
        ScalarType::Float => {
            let value = value.copied();
            quote!(::protoforge::json::from_f32(#value))
        }
        s if s.is_long() => match longs {
            LongRepresentation::DecimalString => {
                quote!(::protoforge::serde_json::Value::String(#receiver.clone()))
            }
            LongRepresentation::NativeWide => {
                let value = value.copied();
                quote!(::protoforge::serde_json::Value::String(long_to_string(#value)))
            }
            LongRepresentation::NativeNumber => {
                let value = value.copied();
                quote!(::protoforge::serde_json::Value::from(#value))
            }
        },
        _ => {
            let value = value.copied();
            quote!(::protoforge::serde_json::Value::from(#value))
        }
    }
}

fn to_json(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, value: &Val) -> TokenStream {
    match kind {
        ValueKind::Scalar(scalar) => scalar_to_json(scalar, mapper.options().long_representation, value),
        ValueKind::Wrapper(wrapper) => {
            scalar_to_json(wrapper.scalar(), LongRepresentation::NativeNumber, value)
        }
        ValueKind::Enum(_) => {
            let receiver = value.receiver();
            quote!(::protoforge::serde_json::Value::String(#receiver.to_json().to_string()))
        }
        ValueKind::Timestamp => {
            let value = value.borrowed();
            quote!(::protoforge::serde_json::Value::String(::protoforge::json::format_timestamp(#value)))
        }
        ValueKind::Message(_) => {
            let receiver = value.receiver();
            quote!(#receiver.to_json())
        }
    }
}

fn scalar_from_json(scalar: ScalarType, decimal: bool, shared_bytes: bool) -> TokenStream {
    let value = quote!(value);
    match scalar {
        ScalarType::String => quote!(::protoforge::json::to_string(#value)?),
        ScalarType::Bytes if shared_bytes => {
            quote!(::protoforge::bytes::Bytes::from(bytes_from_base64(#value)?))
        }
        ScalarType::Bytes => quote!(bytes_from_base64(#value)?),
        ScalarType::Bool => quote!(::protoforge::json::to_bool(#value)?),
        ScalarType::Double => quote!(::protoforge::json::to_f64(#value)?),
        ScalarType::Float => quote!(::protoforge::json::to_f32(#value)?),
        s if s.is_long() && decimal && s.is_unsigned() => quote!(::protoforge::json::to_uint64_string(#value)?),
        s if s.is_long() && decimal => quote!(::protoforge::json::to_int64_string(#value)?),
        s if s.is_long() && s.is_unsigned() => quote!(::protoforge::json::to_u64(#value)?),
        s if s.is_long() => quote!(::protoforge::json::to_i64(#value)?),
        s if s.is_unsigned() => quote!(::protoforge::json::to_u32(#value)?),
        _ => quote!(::protoforge::json::to_i32(#value)?),
    }
}

/// Parse `value: &Value` into one value of `kind`.
fn from_json(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, boxed: bool) -> TokenStream {
    match kind {
        ValueKind::Scalar(scalar) => scalar_from_json(scalar, mapper.decimal_longs(), mapper.shared_bytes()),
        ValueKind::Wrapper(wrapper) => scalar_from_json(wrapper.scalar(), false, false),
        ValueKind::Enum(entry) => {
            let path = mapper.type_path(entry);
            quote!(#path::from_json(value))
        }
        ValueKind::Timestamp => quote!(from_json_timestamp(value)?),
        ValueKind::Message(entry) => {
            let path = mapper.type_path(entry);
            let parsed = quote!(<#path as ::protoforge::JsonMessage>::from_json(value)?);
            if boxed {
                quote!(::std::boxed::Box::new(#parsed))
            } else {
                parsed
            }
        }
    }
}

fn names(json_name: &str, proto_name: &str) -> TokenStream {
    if json_name == proto_name {
        quote!(&[#json_name])
    } else {
        quote!(&[#json_name, #proto_name])
    }
}

fn field_to_json(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let name = &plan.ident;
    let key = &plan.json_name;
    let value_ref = Val::Ref(format_ident!("value"));
    match &plan.layout {
        Layout::Plain => {
            let value = to_json(mapper, plan.kind, &Val::Place(quote!(self.#name)));
            quote! {
                object.insert(::std::string::String::from(#key), #value);
            }
        }
        Layout::Optional if plan.property_optional => {
            let value = to_json(mapper, plan.kind, &value_ref);
            quote! {
                if let ::core::option::Option::Some(value) = &self.#name {
                    object.insert(::std::string::String::from(#key), #value);
                }
            }
        }
        Layout::Optional => {
            let value = to_json(mapper, plan.kind, &value_ref);
            quote! {
                object.insert(
                    ::std::string::String::from(#key),
                    match &self.#name {
                        ::core::option::Option::Some(value) => #value,
                        ::core::option::Option::None => ::protoforge::serde_json::Value::Null,
                    },
                );
            }
        }
        Layout::Repeated => {
            let value = to_json(mapper, plan.kind, &value_ref);
            quote! {
                object.insert(
                    ::std::string::String::from(#key),
                    ::protoforge::serde_json::Value::Array(self.#name.iter().map(|value| #value).collect()),
                );
            }
        }
        Layout::Map(map) => {
            let value = to_json(mapper, map.value.kind, &value_ref);
            quote! {
                object.insert(
                    ::std::string::String::from(#key),
                    ::protoforge::serde_json::Value::Object(
                        self.#name
                            .iter()
                            .map(|(key, value)| (key.to_string(), #value))
                            .collect(),
                    ),
                );
            }
        }
    }
}

/// Parse the JSON object key `key` into a map key.
fn map_key_from_json(mapper: &TypeMapper<'_>, kind: ValueKind<'_>) -> TokenStream {
    match kind {
        ValueKind::Scalar(s) if s.is_long() && mapper.decimal_longs() => {
            let checked = if s.is_unsigned() { quote!(u64) } else { quote!(i64) };
            quote!(::protoforge::json::decimal_key::<#checked>(key)?)
        }
        _ => {
            let key_type = mapper.value_type(kind, false);
            quote!(::protoforge::json::map_key::<#key_type>(key)?)
        }
    }
}

fn field_from_json(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let name = &plan.ident;
    let names = names(&plan.json_name, &plan.field.name);
    let body = match &plan.layout {
        Layout::Plain => {
            let value = from_json(mapper, plan.kind, plan.boxed);
            quote!(message.#name = #value;)
        }
        Layout::Optional => {
            let value = from_json(mapper, plan.kind, plan.boxed);
            quote!(message.#name = ::core::option::Option::Some(#value);)
        }
        Layout::Repeated => {
            let value = from_json(mapper, plan.kind, plan.boxed);
            quote! {
                for value in ::protoforge::json::array(value)? {
                    message.#name.push(#value);
                }
            }
        }
        Layout::Map(map) => {
            let key = map_key_from_json(mapper, map.key.kind);
            let value = from_json(mapper, map.value.kind, false);
            quote! {
                for (key, value) in ::protoforge::json::object(value)? {
                    if value.is_null() {
                        continue;
                    }
                    message.#name.insert(#key, #value);
                }
            }
        }
    };
    quote! {
        if let ::core::option::Option::Some(value) = ::protoforge::json::field(object, #names) {
            #body
        }
    }
}

/// `impl protoforge::JsonMessage` for one message.
pub(crate) fn message_impl(mapper: &TypeMapper<'_>, ident: &Ident, members: &[Member<'_>]) -> TokenStream {
    let mut writes = Vec::new();
    let mut reads = Vec::new();
    for member in members {
        match member {
            Member::Field(plan) => {
                writes.push(field_to_json(mapper, plan));
                reads.push(field_from_json(mapper, plan));
            }
            Member::Union(union) => {
                let name = &union.ident;
                let type_ident = &union.type_ident;
                let cases = union.variants.iter().map(|variant| {
                    let case = &variant.variant;
                    let key = &variant.json_name;
                    let value = to_json(mapper, variant.kind, &Val::Ref(format_ident!("value")));
                    quote! {
                        ::core::option::Option::Some(#type_ident::#case(value)) => {
                            object.insert(::std::string::String::from(#key), #value);
                        }
                    }
                });
                writes.push(quote! {
                    match &self.#name {
                        #(#cases)*
                        ::core::option::Option::None => {}
                    }
                });

                // the first member present in the input wins
                let mut chain = TokenStream::new();
                for (index, variant) in union.variants.iter().enumerate() {
                    let case = &variant.variant;
                    let names = names(&variant.json_name, &variant.field.name);
                    let value = from_json(mapper, variant.kind, variant.boxed);
                    if index > 0 {
                        chain.extend(quote!(else));
                    }
                    chain.extend(quote! {
                        if let ::core::option::Option::Some(value) = ::protoforge::json::field(object, #names) {
                            message.#name = ::core::option::Option::Some(#type_ident::#case(#value));
                        }
                    });
                }
                reads.push(chain);
            }
        }
    }

    quote! {
        impl ::protoforge::JsonMessage for #ident {
            fn to_json(&self) -> ::protoforge::serde_json::Value {
                #[allow(unused_mut)]
                let mut object = ::protoforge::serde_json::Map::new();
                #(#writes)*
                ::protoforge::serde_json::Value::Object(object)
            }

            #[allow(unused_mut)]
            fn from_json(
                value: &::protoforge::serde_json::Value,
            ) -> ::core::result::Result<Self, ::protoforge::JsonError> {
                #[allow(unused_variables)]
                let object = ::protoforge::json::object(value)?;
                let mut message = Self::default();
                #(#reads)*
                ::core::result::Result::Ok(message)
            }
        }
    }
}
