//! Identifier and path conventions for generated code.

use convert_case::{Case, Casing};
use proc_macro2::{Ident, Span, TokenStream};
use quote::{format_ident, quote};

use crate::options::IdentifierCasing;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

// Keywords that cannot be raw identifiers.
const RESERVED: &[&str] = &["self", "Self", "super", "crate", "_"];

/// An identifier for `name`, escaping keywords.
pub fn rust_ident(name: &str) -> Ident {
    if RESERVED.contains(&name) {
        format_ident!("{name}_")
    } else if KEYWORDS.contains(&name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        format_ident!("{name}")
    }
}

/// Snake-case identifier text; names that already are snake case are kept
/// verbatim.
pub fn snake_case(name: &str) -> String {
    let is_snake = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    let snake = if is_snake {
        name.to_string()
    } else {
        name.to_case(Case::Snake)
    };
    if snake.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{snake}")
    } else {
        snake
    }
}

/// Upper snake case for constant names: `EntityService` -> `ENTITY_SERVICE`,
/// `acme.v1` -> `ACME_V1`.
pub fn constant_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c == '.' {
            out.push('_');
        } else {
            if c.is_ascii_uppercase() && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
        }
        prev = Some(c);
    }
    out
}

pub fn field_ident(name: &str) -> Ident {
    rust_ident(&snake_case(name))
}

/// `Pascal` variant identifier for an enum value or oneof member.
pub fn variant_ident(name: &str) -> Ident {
    let pascal = name.to_case(Case::Pascal);
    if pascal.is_empty() || pascal.starts_with(|c: char| c.is_ascii_digit()) {
        format_ident!("_{pascal}")
    } else {
        rust_ident(&pascal)
    }
}

/// Property name used as the JSON key.
pub fn json_name(field: &str, casing: IdentifierCasing) -> String {
    match casing {
        IdentifierCasing::Verbatim => field.to_string(),
        IdentifierCasing::SnakeToCamel => {
            let mut out = String::with_capacity(field.len());
            let mut upper = false;
            for c in field.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        }
    }
}

/// Naive singular: drops one trailing `s`.
pub fn singular(name: &str) -> &str {
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Rust module segments for a `.proto` file path (`a/b.proto` -> `[a, b]`).
pub fn module_segments(path: &str) -> Vec<String> {
    let stem = path.strip_suffix(".proto").unwrap_or(path);
    stem.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut cleaned: String = segment
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
                cleaned.insert(0, '_');
            }
            if KEYWORDS.contains(&cleaned.as_str()) || RESERVED.contains(&cleaned.as_str()) {
                cleaned.push('_');
            }
            cleaned
        })
        .collect()
}

/// Output file name for a `.proto` path (`a/b.proto` -> `a/b.rs`).
pub fn output_file_name(path: &str) -> String {
    format!("{}.rs", module_segments(path).join("/"))
}

/// Path from module `from` to type `name` declared in module `to`.
pub fn relative_type_path(from: &[String], to: &[String], name: &Ident) -> TokenStream {
    let common = from.iter().zip(to).take_while(|(a, b)| a == b).count();
    let supers = (common..from.len()).map(|_| quote!(super::));
    let segments = to[common..].iter().map(|s| format_ident!("{s}"));
    quote! { #(#supers)* #(#segments::)* #name }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(path: &str) -> Vec<String> {
        module_segments(path)
    }

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(rust_ident("type").to_string(), "r#type");
        assert_eq!(rust_ident("self").to_string(), "self_");
        assert_eq!(rust_ident("name").to_string(), "name");
    }

    #[test]
    fn idents_follow_rust_casing() {
        assert_eq!(field_ident("a_number").to_string(), "a_number");
        assert_eq!(field_ident("createdAt").to_string(), "created_at");
        assert_eq!(snake_case("BatchQuery"), "batch_query");
        assert_eq!(variant_ident("STATUS_ACTIVE").to_string(), "StatusActive");
    }

    #[test]
    fn constant_names_are_upper_snake() {
        assert_eq!(constant_case("EntityService"), "ENTITY_SERVICE");
        assert_eq!(constant_case("acme.v1"), "ACME_V1");
        assert_eq!(constant_case("fooBar.baz"), "FOO_BAR_BAZ");
        assert_eq!(constant_case("HTTPGateway"), "HTTPGATEWAY");
    }

    #[test]
    fn json_names_are_lower_camel() {
        assert_eq!(json_name("a_number", IdentifierCasing::SnakeToCamel), "aNumber");
        assert_eq!(json_name("a_number", IdentifierCasing::Verbatim), "a_number");
        assert_eq!(json_name("id", IdentifierCasing::SnakeToCamel), "id");
    }

    #[test]
    fn singular_drops_plural_s() {
        assert_eq!(singular("ids"), "id");
        assert_eq!(singular("entities"), "entitie");
        assert_eq!(singular("s"), "s");
    }

    #[test]
    fn module_paths_from_files() {
        assert_eq!(segments("google/protobuf/timestamp.proto"), ["google", "protobuf", "timestamp"]);
        assert_eq!(segments("my-api/v1.proto"), ["my_api", "v1"]);
        assert_eq!(segments("mod.proto"), ["mod_"]);
        assert_eq!(output_file_name("demo/simple.proto"), "demo/simple.rs");
    }

    #[test]
    fn relative_paths_climb_to_common_prefix() {
        let name = format_ident!("Entity");
        let same = relative_type_path(&segments("a/x.proto"), &segments("a/x.proto"), &name);
        assert_eq!(same.to_string(), "Entity");

        let sibling = relative_type_path(&segments("a/x.proto"), &segments("a/y.proto"), &name);
        assert_eq!(sibling.to_string(), "super :: y :: Entity");

        let far = relative_type_path(&segments("a/x.proto"), &segments("b/c/z.proto"), &name);
        assert_eq!(far.to_string(), "super :: super :: b :: c :: z :: Entity");
    }
}
