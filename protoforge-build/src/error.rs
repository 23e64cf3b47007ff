/// Errors that abort a compilation run.
///
/// Every variant names the offending schema element so a failing `build.rs`
/// points straight at the `.proto` declaration.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// A field or method references a type that no input file declares.
    #[error("unresolved type `{name}` referenced by `{referenced_by}`")]
    UnresolvedType { name: String, referenced_by: String },

    /// A field's type/label combination has no mapping.
    #[error("unhandled field shape for `{field}`: {reason}")]
    UnhandledFieldShape { field: String, reason: String },

    /// The descriptor set is structurally invalid.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The generated token tree did not parse as a Rust file.
    #[error("generated code for `{file}` does not parse: {source}")]
    Emit {
        file: String,
        #[source]
        source: syn::Error,
    },

    #[error("failed to decode descriptor set: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub(crate) fn unresolved(name: &str, referenced_by: impl Into<String>) -> Self {
        CodegenError::UnresolvedType {
            name: name.to_string(),
            referenced_by: referenced_by.into(),
        }
    }

    pub(crate) fn unhandled(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CodegenError::UnhandledFieldShape {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CodegenError> = std::result::Result<T, E>;
