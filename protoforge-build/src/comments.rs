use std::collections::HashMap;

use proc_macro2::TokenStream;
use prost_types::SourceCodeInfo;
use quote::quote;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Comment {
    leading: Option<String>,
    trailing: Option<String>,
}

/// Schema comments keyed by source-code-info path.
#[derive(Clone, Debug, Default)]
pub struct SourceComments {
    by_path: HashMap<Vec<i32>, Comment>,
}

impl SourceComments {
    pub fn from_proto(info: &SourceCodeInfo) -> Self {
        let by_path = info
            .location
            .iter()
            .filter(|l| l.leading_comments.is_some() || l.trailing_comments.is_some())
            .map(|l| {
                (
                    l.path.clone(),
                    Comment {
                        leading: l.leading_comments.clone(),
                        trailing: l.trailing_comments.clone(),
                    },
                )
            })
            .collect();
        Self { by_path }
    }

    /// Sanitized comment lines for `path`, leading comment first.
    pub fn lines(&self, path: &[i32]) -> Vec<String> {
        let Some(comment) = self.by_path.get(path) else {
            return Vec::new();
        };
        let mut lines = Vec::new();
        for text in [&comment.leading, &comment.trailing].into_iter().flatten() {
            let text = sanitize(text);
            let text = text.trim_matches('\n');
            if text.trim().is_empty() {
                continue;
            }
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(text.lines().map(|line| line.trim_end().to_string()));
        }
        lines
    }

    /// `#[doc]` attributes for `path`; empty when the element is undocumented.
    pub fn doc_attrs(&self, path: &[i32]) -> TokenStream {
        doc_attrs(&self.lines(path))
    }
}

pub(crate) fn doc_attrs(lines: &[String]) -> TokenStream {
    let attrs = lines.iter().map(|line| {
        let line = if line.is_empty() {
            String::new()
        } else if line.starts_with(' ') {
            line.clone()
        } else {
            format!(" {line}")
        };
        quote! { #[doc = #line] }
    });
    quote! { #(#attrs)* }
}

/// Normalize line endings and drop control characters other than tab and
/// newline.
pub(crate) fn sanitize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}
