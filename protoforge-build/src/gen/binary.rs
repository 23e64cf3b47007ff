use proc_macro2::{Ident, Literal, TokenStream};
use quote::{format_ident, quote};

use crate::descriptor::ScalarType;
use crate::types::{FieldPlan, Layout, Member, TypeMapper, ValueKind};

/// How generated code reaches a value.
enum Val {
    /// A place of type `T`, e.g. `self.count`.
    Place(TokenStream),
    /// A binding of type `&T`.
    Ref(Ident),
}

impl Val {
    fn copied(&self) -> TokenStream {
        match self {
            Val::Place(place) => quote!(#place),
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

fn wire_type(kind: ValueKind<'_>) -> u32 {
    match kind {
        ValueKind::Scalar(scalar) => scalar.wire_type(),
        ValueKind::Enum(_) => 0,
        ValueKind::Wrapper(_) | ValueKind::Timestamp | ValueKind::Message(_) => 2,
    }
}

fn tag(number: u32, wire_type: u32) -> Literal {
    Literal::u32_unsuffixed((number << 3) | wire_type)
}

/// Write a scalar or enum without its tag.
fn raw_write(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, value: &Val) -> TokenStream {
    match kind {
        ValueKind::Scalar(scalar) => {
            let method = format_ident!("{}", scalar.codec_method());
            match scalar {
                ScalarType::String | ScalarType::Bytes => {
                    let value = value.borrowed();
                    quote!(writer.#method(#value);)
                }
                s if s.is_long() && mapper.decimal_longs() => {
                    let value = value.borrowed();
                    let parse = long_parser(s);
                    quote!(writer.#method(#parse(#value));)
                }
                _ => {
                    let value = value.copied();
                    quote!(writer.#method(#value);)
                }
            }
        }
        ValueKind::Enum(_) => {
            let value = value.copied();
            quote!(writer.int32(#value as i32);)
        }
        ValueKind::Wrapper(_) | ValueKind::Timestamp | ValueKind::Message(_) => {
            unreachable!("length-delimited values are never written untagged")
        }
    }
}

fn long_parser(scalar: ScalarType) -> Ident {
    if scalar.is_unsigned() {
        format_ident!("string_to_ulong")
    } else {
        format_ident!("string_to_long")
    }
}

/// Write a value with its tag.
fn tagged_write(mapper: &TypeMapper<'_>, number: u32, kind: ValueKind<'_>, boxed: bool, value: &Val) -> TokenStream {
    let tag = tag(number, wire_type(kind));
    match kind {
        ValueKind::Scalar(_) | ValueKind::Enum(_) => {
            let raw = raw_write(mapper, kind, value);
            quote! {
                writer.uint32(#tag);
                #raw
            }
        }
        ValueKind::Wrapper(_) => {
            let value = value.borrowed();
            quote!(::protoforge::wkt::encode_wrapper(writer, #tag, #value);)
        }
        ValueKind::Timestamp => {
            let value = value.borrowed();
            quote!(writer.message(#tag, &to_timestamp(#value));)
        }
        ValueKind::Message(_) => {
            let value = match (boxed, value) {
                (true, Val::Ref(ident)) => quote!(&**#ident),
                (true, Val::Place(place)) => quote!(&*#place),
                (false, value) => value.borrowed(),
            };
            quote!(writer.message(#tag, #value);)
        }
    }
}

/// Condition under which a plain field differs from its default.
fn non_default(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, place: &TokenStream) -> TokenStream {
    match kind {
        ValueKind::Scalar(ScalarType::String | ScalarType::Bytes) => quote!(!#place.is_empty()),
        ValueKind::Scalar(ScalarType::Bool) => quote!(#place),
        ValueKind::Scalar(s) if s.is_float() => quote!(#place != 0.0),
        ValueKind::Scalar(s) if s.is_long() && mapper.decimal_longs() => {
            let parse = long_parser(s);
            quote!(#parse(&#place) != 0)
        }
        ValueKind::Scalar(_) => quote!(#place != 0),
        ValueKind::Enum(_) => {
            let default = mapper.default_value(kind);
            quote!(#place != #default)
        }
        ValueKind::Wrapper(_) | ValueKind::Timestamp | ValueKind::Message(_) => quote!(true),
    }
}

/// Read one value of `kind` from `reader`.
fn read(mapper: &TypeMapper<'_>, kind: ValueKind<'_>, boxed: bool) -> TokenStream {
    match kind {
        ValueKind::Scalar(ScalarType::Bytes) if mapper.shared_bytes() => {
            quote!(::protoforge::bytes::Bytes::from(reader.bytes()?))
        }
        ValueKind::Scalar(scalar) => {
            let method = format_ident!("{}", scalar.codec_method());
            if scalar.is_long() && mapper.decimal_longs() {
                quote!(reader.#method()?.to_string())
            } else {
                quote!(reader.#method()?)
            }
        }
        ValueKind::Enum(entry) => {
            let path = mapper.type_path(entry);
            quote!(#path::from_i32(reader.int32()?))
        }
        ValueKind::Wrapper(wrapper) => {
            let ty = wrapper.rust_type();
            quote!(::protoforge::wkt::decode_wrapper::<#ty>(reader)?)
        }
        ValueKind::Timestamp => {
            quote!(from_timestamp(reader.message::<::protoforge::wkt::Timestamp>()?))
        }
        ValueKind::Message(entry) => {
            let path = mapper.type_path(entry);
            if boxed {
                quote!(::std::boxed::Box::new(reader.message::<#path>()?))
            } else {
                quote!(reader.message::<#path>()?)
            }
        }
    }
}

fn encode_field(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let name = &plan.ident;
    let number = plan.field.number;
    match &plan.layout {
        Layout::Plain => {
            let place = quote!(self.#name);
            let condition = non_default(mapper, plan.kind, &place);
            let write = tagged_write(mapper, number, plan.kind, plan.boxed, &Val::Place(place));
            quote! {
                if #condition {
                    #write
                }
            }
        }
        Layout::Optional => {
            let write = tagged_write(mapper, number, plan.kind, plan.boxed, &Val::Ref(format_ident!("value")));
            quote! {
                if let ::core::option::Option::Some(value) = &self.#name {
                    #write
                }
            }
        }
        Layout::Repeated if plan.is_packed() => {
            let tag = tag(number, 2);
            let raw = raw_write(mapper, plan.kind, &Val::Ref(format_ident!("value")));
            quote! {
                if !self.#name.is_empty() {
                    writer.uint32(#tag).fork();
                    for value in &self.#name {
                        #raw
                    }
                    writer.ldelim();
                }
            }
        }
        Layout::Repeated => {
            let write = tagged_write(mapper, number, plan.kind, plan.boxed, &Val::Ref(format_ident!("value")));
            quote! {
                for value in &self.#name {
                    #write
                }
            }
        }
        Layout::Map(map) => {
            let tag = tag(number, 2);
            let key = tagged_write(mapper, map.key.field.number, map.key.kind, false, &Val::Ref(format_ident!("key")));
            let value = tagged_write(
                mapper,
                map.value.field.number,
                map.value.kind,
                false,
                &Val::Ref(format_ident!("value")),
            );
            quote! {
                for (key, value) in &self.#name {
                    writer.uint32(#tag).fork();
                    #key
                    #value
                    writer.ldelim();
                }
            }
        }
    }
}

fn decode_field(mapper: &TypeMapper<'_>, plan: &FieldPlan<'_>) -> TokenStream {
    let name = &plan.ident;
    let number = Literal::u32_unsuffixed(plan.field.number);
    let value = read(mapper, plan.kind, plan.boxed);
    let body = match &plan.layout {
        Layout::Plain => quote!(message.#name = #value;),
        Layout::Optional => quote!(message.#name = ::core::option::Option::Some(#value);),
        Layout::Repeated if plan.is_packed() => quote! {
            if tag & 7 == 2 {
                let packed_end = reader.packed_end()?;
                while reader.pos() < packed_end {
                    message.#name.push(#value);
                }
                reader.finish_frame(packed_end)?;
            } else {
                message.#name.push(#value);
            }
        },
        Layout::Repeated => quote!(message.#name.push(#value);),
        Layout::Map(map) => {
            let entry = mapper.type_path(map.entry);
            let stored = match (&map.value.layout, map.value.boxed) {
                (Layout::Optional, true) => quote!(entry.value.map(|value| *value).unwrap_or_default()),
                (Layout::Optional, false) => quote!(entry.value.unwrap_or_default()),
                _ => quote!(entry.value),
            };
            quote! {
                let entry = reader.message::<#entry>()?;
                message.#name.insert(entry.key, #stored);
            }
        }
    };
    quote! {
        #number => {
            #body
        }
    }
}

/// `impl protoforge::Message` for one message.
pub(crate) fn message_impl(mapper: &TypeMapper<'_>, ident: &Ident, members: &[Member<'_>]) -> TokenStream {
    let mut encodes = Vec::new();
    let mut arms = Vec::new();
    for member in members {
        match member {
            Member::Field(plan) => {
                encodes.push(encode_field(mapper, plan));
                arms.push(decode_field(mapper, plan));
            }
            Member::Union(union) => {
                let name = &union.ident;
                let type_ident = &union.type_ident;
                let cases = union.variants.iter().map(|variant| {
                    let case = &variant.variant;
                    let write = tagged_write(
                        mapper,
                        variant.field.number,
                        variant.kind,
                        variant.boxed,
                        &Val::Ref(format_ident!("value")),
                    );
                    quote! {
                        ::core::option::Option::Some(#type_ident::#case(value)) => {
                            #write
                        }
                    }
                });
                encodes.push(quote! {
                    match &self.#name {
                        #(#cases)*
                        ::core::option::Option::None => {}
                    }
                });
                for variant in &union.variants {
                    let case = &variant.variant;
                    let number = Literal::u32_unsuffixed(variant.field.number);
                    let value = read(mapper, variant.kind, variant.boxed);
                    arms.push(quote! {
                        #number => {
                            message.#name = ::core::option::Option::Some(#type_ident::#case(#value));
                        }
                    });
                }
            }
        }
    }

    quote! {
        impl ::protoforge::Message for #ident {
            #[allow(unused_variables)]
            fn encode(&self, writer: &mut ::protoforge::Writer) {
                #(#encodes)*
            }

            #[allow(unused_mut)]
            fn decode(
                reader: &mut ::protoforge::Reader<'_>,
                length: ::core::option::Option<usize>,
            ) -> ::core::result::Result<Self, ::protoforge::DecodeError> {
                let end = reader.frame_end(length)?;
                let mut message = Self::default();
                while reader.pos() < end {
                    let tag = reader.uint32()?;
                    match tag >> 3 {
                        #(#arms)*
                        _ => {
                            reader.skip_type(tag & 7)?;
                        }
                    }
                }
                reader.finish_frame(end)?;
                ::core::result::Result::Ok(message)
            }
        }
    }
}
