//! Module assembly: one generated Rust module per input `.proto` file.

use std::collections::HashSet;

use proc_macro2::{TokenStream, TokenTree};
use quote::quote;

use crate::descriptor::{EnumDescriptor, FILE_SYNTAX, FileUnit, MessageDescriptor, Syntax};
use crate::error::{CodegenError, Result};
use crate::naming::{module_segments, output_file_name, rust_ident};
use crate::options::GenerationOptions;
use crate::registry::TypeRegistry;
use crate::types::TypeMapper;

mod binary;
mod client;
mod declaration;
mod json;
mod partial;
mod service;


/// A rendered output file, named relative to the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedFile {
    /// `a/b.rs` for `a/b.proto`.
    pub name: String,
    pub content: String,
}

/// File-local helpers, emitted only when the module body calls them.
fn helpers() -> Vec<(&'static str, TokenStream)> {
    vec![
        (
            "long_to_string",
            quote! {
                fn long_to_string<T: ::std::string::ToString>(value: T) -> ::std::string::String {
                    value.to_string()
                }
            },
        ),
        (
            "string_to_long",
            quote! {
                fn string_to_long(value: &str) -> i64 {
                    ::protoforge::int64_from_decimal(value)
                }
            },
        ),
        (
            "string_to_ulong",
            quote! {
                fn string_to_ulong(value: &str) -> u64 {
                    ::protoforge::uint64_from_decimal(value)
                }
            },
        ),
        (
            "bytes_from_base64",
            quote! {
                fn bytes_from_base64(
                    value: &::protoforge::serde_json::Value,
                ) -> ::core::result::Result<::std::vec::Vec<u8>, ::protoforge::JsonError> {
                    ::protoforge::json::decode_base64(&::protoforge::json::to_string(value)?)
                }
            },
        ),
        (
            "base64_from_bytes",
            quote! {
                fn base64_from_bytes(bytes: &[u8]) -> ::std::string::String {
                    ::protoforge::json::encode_base64(bytes)
                }
            },
        ),
        (
            "to_timestamp",
            quote! {
                fn to_timestamp(
                    date: &::protoforge::chrono::DateTime<::protoforge::chrono::Utc>,
                ) -> ::protoforge::wkt::Timestamp {
                    ::protoforge::wkt::Timestamp::from_datetime(date)
                }
            },
        ),
        (
            "from_timestamp",
            quote! {
                fn from_timestamp(
                    timestamp: ::protoforge::wkt::Timestamp,
                ) -> ::protoforge::chrono::DateTime<::protoforge::chrono::Utc> {
                    timestamp.to_datetime()
                }
            },
        ),
        (
            "from_json_timestamp",
            quote! {
                fn from_json_timestamp(
                    value: &::protoforge::serde_json::Value,
                ) -> ::core::result::Result<
                    ::protoforge::chrono::DateTime<::protoforge::chrono::Utc>,
                    ::protoforge::JsonError,
                > {
                    ::protoforge::json::parse_timestamp(value)
                }
            },
        ),
        (
            "DeepPartial",
            quote! {
                type DeepPartial<T> = <T as ::protoforge::FromPartial>::Partial;
            },
        ),
    ]
}

fn collect_idents(tokens: TokenStream, idents: &mut HashSet<String>) {
    for tree in tokens {
        match tree {
            TokenTree::Ident(ident) => {
                idents.insert(ident.to_string());
            }
            TokenTree::Group(group) => collect_idents(group.stream(), idents),
            TokenTree::Punct(_) | TokenTree::Literal(_) => {}
        }
    }
}

struct FileGenerator<'a> {
    mapper: TypeMapper<'a>,
    out: TokenStream,
}

impl<'a> FileGenerator<'a> {
    fn enumeration(&mut self, qualified_name: &str, en: &EnumDescriptor, referenced_by: &str) -> Result<()> {
        let entry = self.mapper.registry().resolve(qualified_name, referenced_by)?;
        let ident = rust_ident(&entry.generated_name);
        let with_json = self.mapper.options().emit_json_codec;
        self.out
            .extend(declaration::enumeration(&self.mapper, en, &ident, with_json));
        Ok(())
    }

    fn message(&mut self, qualified_name: &str, message: &'a MessageDescriptor, referenced_by: &str) -> Result<()> {
        for en in &message.nested_enums {
            self.enumeration(&format!("{qualified_name}.{}", en.name), en, qualified_name)?;
        }

        let entry = self.mapper.registry().resolve(qualified_name, referenced_by)?;
        let ident = rust_ident(&entry.generated_name);
        let members = self.mapper.members(message, qualified_name)?;
        let options = self.mapper.options();

        self.out
            .extend(declaration::message(&self.mapper, message, &ident, &members));
        if options.emit_binary_codec {
            self.out.extend(binary::message_impl(&self.mapper, &ident, &members));
        }
        if options.emit_json_codec {
            self.out.extend(json::message_impl(&self.mapper, &ident, &members));
            self.out.extend(partial::message_partial(&self.mapper, &ident, &members));
        }

        for nested in &message.nested_messages {
            self.message(&format!("{qualified_name}.{}", nested.name), nested, qualified_name)?;
        }
        Ok(())
    }
}

/// Header comment: generator marker plus the schema's syntax line and its
/// leading comment.
fn header(file: &FileUnit) -> String {
    let syntax = match file.syntax {
        Syntax::Proto2 => "proto2",
        Syntax::Proto3 => "proto3",
        Syntax::Editions => "editions",
    };
    let mut header = String::from("// @generated by protoforge-build. DO NOT EDIT.\n");
    header.push_str(&format!("// source: {} ({syntax})\n", file.path));
    for line in file.comments.lines(&[FILE_SYNTAX]) {
        if line.is_empty() {
            header.push_str("//\n");
        } else {
            header.push_str(&format!("// {}\n", line.trim_start()));
        }
    }
    header.push('\n');
    header
}

/// Generate the module for one file. `registry` must cover every file the
/// unit (transitively) imports.
pub fn generate_file(
    file: &FileUnit,
    registry: &TypeRegistry<'_>,
    options: &GenerationOptions,
) -> Result<GeneratedFile> {
    let module = module_segments(&file.path);
    let name = output_file_name(&file.path);
    let prefix = if file.package.is_empty() {
        String::new()
    } else {
        format!(".{}", file.package)
    };

    let mut generator = FileGenerator {
        mapper: TypeMapper::new(registry, options, &module, &file.comments),
        out: TokenStream::new(),
    };
    for en in &file.enums {
        generator.enumeration(&format!("{prefix}.{}", en.name), en, &file.path)?;
    }
    for message in &file.messages {
        generator.message(&format!("{prefix}.{}", message.name), message, &file.path)?;
    }

    let mapper = &generator.mapper;
    if options.server_controllers && !file.package.is_empty() {
        generator.out.extend(service::package_name_const(file));
    }
    for service in &file.services {
        let info = service::service_info(mapper, file, service)?;
        let declaration = if options.server_controllers {
            service::controller_items(mapper, &info)
        } else {
            service::service_trait(mapper, &info)
        };
        generator.out.extend(declaration);
        if options.emit_client_impl {
            if !options.emit_binary_codec {
                tracing::warn!(
                    service = %info.full_name,
                    "client impl needs the binary codec, skipping"
                );
            } else if options.server_controllers || options.metadata_parameter {
                tracing::warn!(
                    service = %info.full_name,
                    "client impl is not generated for controllers or metadata parameters, skipping"
                );
            } else {
                let client = client::client_impl(mapper, &info);
                generator.out.extend(client);
            }
        }
    }

    let body = generator.out;
    let mut used = HashSet::new();
    collect_idents(body.clone(), &mut used);
    let helpers = helpers()
        .into_iter()
        .filter(|(name, _)| used.contains(*name))
        .map(|(_, helper)| {
            quote! {
                #[allow(dead_code)]
                #helper
            }
        });

    let tokens = quote! {
        #[allow(unused_imports)]
        use ::protoforge::{JsonMessage as _, Message as _};

        #(#helpers)*

        #body
    };
    let ast = syn::parse2::<syn::File>(tokens).map_err(|source| CodegenError::Emit {
        file: file.path.clone(),
        source,
    })?;

    let mut content = header(file);
    content.push_str(&prettyplease::unparse(&ast));
    tracing::debug!(file = %file.path, output = %name, "generated module");
    Ok(GeneratedFile { name, content })
}
