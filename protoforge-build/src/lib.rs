//! Protobuf schema compiler emitting Rust message types, binary and JSON
//! codecs, partial-merge constructors and service clients with request
//! batching.
//!
//! Three entry points share one pipeline (descriptor model → type registry →
//! generators → `prettyplease`):
//!
//! - [`generate`]: the pure core, from a `FileDescriptorSet` to rendered files
//! - [`compile_dir`] / [`compile_descriptor_set`]: a builder for `build.rs`
//! - the `protoc-gen-protoforge` plugin binary, via [`generate_request`]
//!
//! Generated code depends on the `protoforge` runtime crate.

use std::path::{Path, PathBuf};

use prost::Message as _;
use prost_types::FileDescriptorSet;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse, code_generator_response};

mod comments;
mod descriptor;
mod error;
mod r#gen;
mod include_file;
mod naming;
mod options;
mod registry;
mod types;

pub use error::{CodegenError, Result};
pub use r#gen::GeneratedFile;
pub use options::*;

use descriptor::FileUnit;
use registry::TypeRegistry;

/// Generate Rust modules for `files_to_generate` (file names as they appear
/// in the descriptor set). Every file of `descriptor_set` participates in
/// type resolution, so imports must be included.
pub fn generate(
    descriptor_set: &FileDescriptorSet,
    files_to_generate: &[String],
    options: &GenerationOptions,
) -> Result<Vec<GeneratedFile>> {
    let units = descriptor_set
        .file
        .iter()
        .map(FileUnit::from_proto)
        .collect::<Result<Vec<_>>>()?;
    let registry = TypeRegistry::new(&units);

    let mut generated = Vec::with_capacity(files_to_generate.len());
    for name in files_to_generate {
        let unit = units
            .iter()
            .find(|unit| &unit.path == name)
            .ok_or_else(|| CodegenError::InvalidDescriptor(format!("`{name}` is not in the descriptor set")))?;
        generated.push(r#gen::generate_file(unit, &registry, options)?);
    }
    Ok(generated)
}

/// Run one protoc plugin request. Failures are reported through the
/// response's `error` field.
pub fn generate_request(request: &CodeGeneratorRequest) -> CodeGeneratorResponse {
    let options = GenerationOptions::from_parameter(request.parameter());
    let descriptor_set = FileDescriptorSet {
        file: request.proto_file.clone(),
    };

    let mut response = CodeGeneratorResponse {
        supported_features: Some(code_generator_response::Feature::Proto3Optional as u64),
        ..Default::default()
    };
    match generate(&descriptor_set, &request.file_to_generate, &options) {
        Ok(files) => {
            response.file = files
                .into_iter()
                .map(|file| code_generator_response::File {
                    name: Some(file.name),
                    content: Some(file.content),
                    ..Default::default()
                })
                .collect();
        }
        Err(err) => {
            tracing::error!(error = %err, "code generation failed");
            response.error = Some(err.to_string());
        }
    }
    response
}

/// Decode an encoded `CodeGeneratorRequest` and run it.
pub fn generate_request_bytes(request: &[u8]) -> Result<Vec<u8>> {
    let request = CodeGeneratorRequest::decode(request)?;
    Ok(generate_request(&request).encode_to_vec())
}

enum Source {
    Dir(PathBuf),
    DescriptorSet(FileDescriptorSet),
}

/// Builder that compiles schemas into `OUT_DIR` (or a custom directory) for
/// use from `build.rs`.
pub struct CompileBuilder {
    source: Source,
    options: GenerationOptions,
    prost_config: Option<Box<dyn FnOnce(&mut prost_build::Config)>>,
    out_dir: Option<PathBuf>,
    include_file: Option<String>,
    files: Option<Vec<String>>,
}

impl CompileBuilder {
    fn new(source: Source) -> Self {
        Self {
            source,
            options: GenerationOptions::default(),
            prost_config: None,
            out_dir: None,
            include_file: Some("protos.rs".to_string()),
            files: None,
        }
    }

    /// Replace the generation options.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use protoforge_build::{GenerationOptions, LongRepresentation};
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     protoforge_build::compile_dir("proto")
    ///         .with_options(
    ///             GenerationOptions::default()
    ///                 .with_long_representation(LongRepresentation::DecimalString)
    ///                 .with_context_propagation(true),
    ///         )
    ///         .compile()?;
    ///     Ok(())
    /// }
    /// ```
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Customize the `prost_build::Config` used to invoke `protoc`.
    ///
    /// Only used by [`compile_dir`]; descriptor sets are taken as given.
    pub fn with_prost_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut prost_build::Config) + 'static,
    {
        self.prost_config = Some(Box::new(f));
        self
    }

    /// Fetch protoc and point `PROTOC` at it.
    ///
    /// `version` defaults to "31.1", `path` to `OUT_DIR`.
    #[cfg(feature = "fetch-protoc")]
    pub fn fetch_protoc(self, version: Option<&str>, path: Option<&Path>) -> std::io::Result<Self> {
        let version = version.unwrap_or("31.1");
        let out_dir = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(env_out_dir()?),
        };

        let protoc_path = protoc_fetcher::protoc(version, &out_dir)
            .map_err(|e| std::io::Error::other(format!("failed to fetch protoc: {e}")))?;

        // SAFETY: build scripts run single-threaded before compilation, so no
        // other thread reads the environment concurrently.
        unsafe {
            std::env::set_var("PROTOC", protoc_path);
        }

        Ok(self)
    }

    /// Write generated files here instead of `OUT_DIR`. Include paths then
    /// become absolute.
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Name of the module-tree include file, or `None` to skip it.
    pub fn include_file(mut self, name: Option<&str>) -> Self {
        self.include_file = name.map(str::to_string);
        self
    }

    /// Restrict generation to these descriptor file names. Defaults to every
    /// discovered file for [`compile_dir`] and every non-`google/protobuf`
    /// file for [`compile_descriptor_set`].
    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    /// Run code generation and write the files.
    pub fn compile(self) -> Result<Vec<GeneratedFile>> {
        let (out_dir, from_out_dir_env) = match &self.out_dir {
            Some(dir) => (dir.clone(), false),
            None => (PathBuf::from(env_out_dir()?), true),
        };

        let (descriptor_set, default_files) = match self.source {
            Source::Dir(dir) => {
                let mut proto_files = Vec::new();
                discover_proto_files(&dir, &mut proto_files)?;
                if proto_files.is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("No .proto files found in directory: {}", dir.display()),
                    )
                    .into());
                }
                proto_files.sort();

                let mut config = prost_build::Config::new();
                if let Some(config_fn) = self.prost_config {
                    config_fn(&mut config);
                }
                let descriptor_set = config.load_fds(&proto_files, &[&dir])?;
                let names = proto_files
                    .iter()
                    .filter_map(|path| relative_name(&dir, path))
                    .collect();
                (descriptor_set, names)
            }
            Source::DescriptorSet(descriptor_set) => {
                let names = descriptor_set
                    .file
                    .iter()
                    .map(|file| file.name().to_string())
                    .filter(|name| !name.starts_with("google/protobuf/"))
                    .collect();
                (descriptor_set, names)
            }
        };
        let files = self.files.unwrap_or(default_files);

        let generated = generate(&descriptor_set, &files, &self.options)?;
        for file in &generated {
            let path = out_dir.join(&file.name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &file.content)?;
            tracing::debug!(path = %path.display(), "wrote generated file");
        }

        if let Some(include_file_name) = &self.include_file {
            let names: Vec<String> = generated.iter().map(|file| file.name.clone()).collect();
            include_file::generate(include_file_name, &out_dir, &names, from_out_dir_env)?;
        }
        Ok(generated)
    }
}

fn env_out_dir() -> std::io::Result<String> {
    std::env::var("OUT_DIR").map_err(|e| std::io::Error::other(format!("OUT_DIR not set: {e}")))
}

/// `dir`-relative, `/`-separated name of `path`, as protoc records it.
fn relative_name(dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(dir).ok()?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}

/// Auto-discover every `.proto` file under `includes_dir` and compile them.
///
/// # Example
///
/// ```rust,no_run
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     protoforge_build::compile_dir("proto").compile()?;
///     Ok(())
/// }
/// ```
pub fn compile_dir(includes_dir: impl AsRef<Path>) -> CompileBuilder {
    CompileBuilder::new(Source::Dir(includes_dir.as_ref().to_path_buf()))
}

/// Compile an already-built descriptor set. Files imported by the generated
/// ones (including `google/protobuf/*.proto`) must be part of the set.
pub fn compile_descriptor_set(descriptor_set: FileDescriptorSet) -> CompileBuilder {
    CompileBuilder::new(Source::DescriptorSet(descriptor_set))
}

fn discover_proto_files(dir: &Path, proto_files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        ));
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("proto") {
            proto_files.push(path);
        } else if path.is_dir() {
            discover_proto_files(&path, proto_files)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, field_descriptor_proto};

    fn set() -> FileDescriptorSet {
        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("acme/ping.proto".to_string()),
                package: Some("acme".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![DescriptorProto {
                    name: Some("Ping".to_string()),
                    field: vec![FieldDescriptorProto {
                        name: Some("seq".to_string()),
                        number: Some(1),
                        label: Some(field_descriptor_proto::Label::Optional as i32),
                        r#type: Some(field_descriptor_proto::Type::Uint32 as i32),
                        json_name: Some("seq".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn generate_names_files_after_their_path() {
        let files = generate(&set(), &["acme/ping.proto".to_string()], &GenerationOptions::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "acme/ping.rs");
        assert!(files[0].content.contains("pub struct Ping"));
    }

    #[test]
    fn unknown_file_is_an_error() {
        let err = generate(&set(), &["missing.proto".to_string()], &GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, CodegenError::InvalidDescriptor(_)));
    }

    #[test]
    fn plugin_request_reports_errors_in_response() {
        let request = CodeGeneratorRequest {
            file_to_generate: vec!["missing.proto".to_string()],
            proto_file: set().file,
            ..Default::default()
        };
        let response = generate_request(&request);
        assert!(response.error.is_some());
        assert!(response.file.is_empty());
        assert_eq!(response.supported_features, Some(1));
    }

    #[test]
    fn plugin_request_round_trips_through_bytes() {
        let request = CodeGeneratorRequest {
            file_to_generate: vec!["acme/ping.proto".to_string()],
            parameter: Some("outputJsonMethods=false".to_string()),
            proto_file: set().file,
            ..Default::default()
        };
        let encoded = generate_request_bytes(&request.encode_to_vec()).unwrap();
        let response = CodeGeneratorResponse::decode(encoded.as_slice()).unwrap();
        assert_eq!(response.error, None);
        assert_eq!(response.file.len(), 1);
        let content = response.file[0].content();
        assert!(content.contains("impl ::protoforge::Message for Ping"));
        assert!(!content.contains("JsonMessage for Ping"));
    }

    #[test]
    fn relative_names_use_forward_slashes() {
        let dir = Path::new("proto");
        let path = dir.join("acme").join("ping.proto");
        assert_eq!(relative_name(dir, &path).as_deref(), Some("acme/ping.proto"));
    }
}
