//! Generation options.
//!
//! Every generator reads only the switches relevant to it, and the same
//! descriptors with the same options always produce the same output.

/// Casing of generated JSON property names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentifierCasing {
    /// Keep the schema field name (`a_number`).
    Verbatim,
    /// Convert to lower camel case (`aNumber`).
    #[default]
    SnakeToCamel,
}

/// Rust representation of `int64`/`uint64` and their fixed/zigzag variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LongRepresentation {
    /// `i64`/`u64`, rendered as JSON numbers.
    #[default]
    NativeNumber,
    /// `i64`/`u64`, rendered as JSON decimal strings.
    NativeWide,
    /// `String` holding the decimal value.
    DecimalString,
}

/// How an unset message or wrapper field is represented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptionalStyle {
    /// The value type is nullable; JSON renders `null`.
    #[default]
    WrapInUndefinedUnion,
    /// The property itself is optional; JSON omits the key.
    NativeOptionalProperty,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OneofStyle {
    /// Each oneof member is its own optional field.
    #[default]
    SiblingOptionalProperties,
    /// A oneof group is one field holding an enum with one variant per member.
    DiscriminatedUnion,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceMethodCasing {
    /// Method idents keep the schema name (`BatchQuery`).
    AsDeclared,
    /// Method idents are snake case (`batch_query`).
    #[default]
    ForceLowerFirst,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamingReturnStyle {
    /// Unary methods return a future; server-streaming methods a stream.
    #[default]
    PromiseLike,
    /// Every method returns a stream.
    ReactiveStream,
}

/// Selects the concrete byte-sequence type for `bytes` fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TargetRuntime {
    /// `bytes::Bytes`.
    NodeLike,
    /// `Vec<u8>`.
    BrowserLike,
    /// `Vec<u8>`.
    #[default]
    Either,
}

/// Immutable configuration for one compilation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationOptions {
    pub identifier_casing: IdentifierCasing,
    pub long_representation: LongRepresentation,
    pub optional_style: OptionalStyle,
    pub oneof_style: OneofStyle,
    pub emit_binary_codec: bool,
    pub emit_json_codec: bool,
    pub emit_client_impl: bool,
    pub service_method_casing: ServiceMethodCasing,
    pub streaming_return_style: StreamingReturnStyle,
    pub context_propagation: bool,
    pub target_runtime: TargetRuntime,
    /// Emit `{Service}Controller` and `{Service}Client` traits plus package,
    /// service and route-name constants in place of the single service trait.
    pub server_controllers: bool,
    /// Every service method takes a trailing `Option<&Metadata>`.
    pub metadata_parameter: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            identifier_casing: IdentifierCasing::default(),
            long_representation: LongRepresentation::default(),
            optional_style: OptionalStyle::default(),
            oneof_style: OneofStyle::default(),
            emit_binary_codec: true,
            emit_json_codec: true,
            emit_client_impl: true,
            service_method_casing: ServiceMethodCasing::default(),
            streaming_return_style: StreamingReturnStyle::default(),
            context_propagation: false,
            target_runtime: TargetRuntime::default(),
            server_controllers: false,
            metadata_parameter: false,
        }
    }
}

impl GenerationOptions {
    /// Parse a protoc plugin parameter string: comma-separated `key=value`
    /// pairs. Unknown keys and unparsable values are ignored.
    ///
    /// `nestJs=true` also forces snake-case method names and turns the client
    /// impl off. `addGrpcMetadata` only takes effect together with `nestJs`.
    ///
    /// ```
    /// use protoforge_build::{GenerationOptions, LongRepresentation, OneofStyle};
    ///
    /// let options = GenerationOptions::from_parameter("forceLong=string,oneof=unions");
    /// assert_eq!(options.long_representation, LongRepresentation::DecimalString);
    /// assert_eq!(options.oneof_style, OneofStyle::DiscriminatedUnion);
    /// ```
    pub fn from_parameter(parameter: &str) -> Self {
        let mut options = Self::default();
        for pair in parameter.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
            if !options.apply(key.trim(), value.trim()) {
                tracing::warn!(key, value, "ignoring generation option");
            }
        }
        if options.server_controllers {
            options.service_method_casing = ServiceMethodCasing::ForceLowerFirst;
            options.emit_client_impl = false;
        } else if options.metadata_parameter {
            tracing::warn!("addGrpcMetadata needs nestJs=true, ignoring");
            options.metadata_parameter = false;
        }
        options
    }

    fn apply(&mut self, key: &str, value: &str) -> bool {
        let applied = match key {
            "snakeToCamel" => parse_bool(value).map(|b| {
                self.identifier_casing = if b {
                    IdentifierCasing::SnakeToCamel
                } else {
                    IdentifierCasing::Verbatim
                }
            }),
            "forceLong" => match value {
                "number" | "false" => Some(LongRepresentation::NativeNumber),
                "long" | "true" => Some(LongRepresentation::NativeWide),
                "string" => Some(LongRepresentation::DecimalString),
                _ => None,
            }
            .map(|r| self.long_representation = r),
            "useOptionals" => parse_bool(value).map(|b| {
                self.optional_style = if b {
                    OptionalStyle::NativeOptionalProperty
                } else {
                    OptionalStyle::WrapInUndefinedUnion
                }
            }),
            "oneof" => match value {
                "properties" => Some(OneofStyle::SiblingOptionalProperties),
                "unions" => Some(OneofStyle::DiscriminatedUnion),
                _ => None,
            }
            .map(|s| self.oneof_style = s),
            "outputEncodeMethods" => parse_bool(value).map(|b| self.emit_binary_codec = b),
            "outputJsonMethods" => parse_bool(value).map(|b| self.emit_json_codec = b),
            "outputClientImpl" => parse_bool(value).map(|b| self.emit_client_impl = b),
            "lowerCaseServiceMethods" => parse_bool(value).map(|b| {
                self.service_method_casing = if b {
                    ServiceMethodCasing::ForceLowerFirst
                } else {
                    ServiceMethodCasing::AsDeclared
                }
            }),
            "returnObservable" => parse_bool(value).map(|b| {
                self.streaming_return_style = if b {
                    StreamingReturnStyle::ReactiveStream
                } else {
                    StreamingReturnStyle::PromiseLike
                }
            }),
            "context" => parse_bool(value).map(|b| self.context_propagation = b),
            "env" => match value {
                "node" => Some(TargetRuntime::NodeLike),
                "browser" => Some(TargetRuntime::BrowserLike),
                "both" => Some(TargetRuntime::Either),
                _ => None,
            }
            .map(|t| self.target_runtime = t),
            "nestJs" => parse_bool(value).map(|b| self.server_controllers = b),
            "addGrpcMetadata" => parse_bool(value).map(|b| self.metadata_parameter = b),
            _ => {
                tracing::debug!(key, "unknown generation option");
                Some(())
            }
        };
        applied.is_some()
    }

    pub fn with_identifier_casing(mut self, casing: IdentifierCasing) -> Self {
        self.identifier_casing = casing;
        self
    }

    pub fn with_long_representation(mut self, representation: LongRepresentation) -> Self {
        self.long_representation = representation;
        self
    }

    pub fn with_optional_style(mut self, style: OptionalStyle) -> Self {
        self.optional_style = style;
        self
    }

    pub fn with_oneof_style(mut self, style: OneofStyle) -> Self {
        self.oneof_style = style;
        self
    }

    pub fn with_binary_codec(mut self, emit: bool) -> Self {
        self.emit_binary_codec = emit;
        self
    }

    pub fn with_json_codec(mut self, emit: bool) -> Self {
        self.emit_json_codec = emit;
        self
    }

    pub fn with_client_impl(mut self, emit: bool) -> Self {
        self.emit_client_impl = emit;
        self
    }

    pub fn with_service_method_casing(mut self, casing: ServiceMethodCasing) -> Self {
        self.service_method_casing = casing;
        self
    }

    pub fn with_streaming_return_style(mut self, style: StreamingReturnStyle) -> Self {
        self.streaming_return_style = style;
        self
    }

    pub fn with_context_propagation(mut self, enabled: bool) -> Self {
        self.context_propagation = enabled;
        self
    }

    pub fn with_target_runtime(mut self, runtime: TargetRuntime) -> Self {
        self.target_runtime = runtime;
        self
    }

    pub fn with_server_controllers(mut self, enabled: bool) -> Self {
        self.server_controllers = enabled;
        self
    }

    pub fn with_metadata_parameter(mut self, enabled: bool) -> Self {
        self.metadata_parameter = enabled;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_parameter_yields_defaults() {
        assert_eq!(GenerationOptions::from_parameter(""), GenerationOptions::default());
    }

    #[test]
    fn parses_every_known_key() {
        let options = GenerationOptions::from_parameter(
            "snakeToCamel=false,forceLong=long,useOptionals=true,oneof=unions,\
             outputEncodeMethods=false,outputJsonMethods=false,outputClientImpl=false,\
             lowerCaseServiceMethods=false,returnObservable=true,context=true,env=node",
        );
        assert_eq!(options.identifier_casing, IdentifierCasing::Verbatim);
        assert_eq!(options.long_representation, LongRepresentation::NativeWide);
        assert_eq!(options.optional_style, OptionalStyle::NativeOptionalProperty);
        assert_eq!(options.oneof_style, OneofStyle::DiscriminatedUnion);
        assert!(!options.emit_binary_codec);
        assert!(!options.emit_json_codec);
        assert!(!options.emit_client_impl);
        assert_eq!(options.service_method_casing, ServiceMethodCasing::AsDeclared);
        assert_eq!(options.streaming_return_style, StreamingReturnStyle::ReactiveStream);
        assert!(options.context_propagation);
        assert_eq!(options.target_runtime, TargetRuntime::NodeLike);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_ignored() {
        let options = GenerationOptions::from_parameter("esModuleInterop=true,forceLong=huge, context");
        assert_eq!(options.long_representation, LongRepresentation::NativeNumber);
        assert!(options.context_propagation);
    }

    #[test]
    fn force_long_true_means_wide() {
        let options = GenerationOptions::from_parameter("forceLong=true");
        assert_eq!(options.long_representation, LongRepresentation::NativeWide);
        let options = GenerationOptions::from_parameter("forceLong=string,forceLong=false");
        assert_eq!(options.long_representation, LongRepresentation::NativeNumber);
    }

    #[test]
    fn nest_js_implies_controller_defaults() {
        let options = GenerationOptions::from_parameter(
            "lowerCaseServiceMethods=false,outputClientImpl=true,nestJs=true,addGrpcMetadata=true",
        );
        assert!(options.server_controllers);
        assert!(options.metadata_parameter);
        assert_eq!(options.service_method_casing, ServiceMethodCasing::ForceLowerFirst);
        assert!(!options.emit_client_impl);
        assert!(options.emit_binary_codec, "codecs stay as configured");
    }

    #[test]
    fn metadata_needs_nest_js() {
        let options = GenerationOptions::from_parameter("addGrpcMetadata=true");
        assert!(!options.metadata_parameter);
        assert_eq!(options, GenerationOptions::default());
    }
}
