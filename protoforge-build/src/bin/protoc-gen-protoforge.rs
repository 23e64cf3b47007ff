//! `protoc` plugin: reads a `CodeGeneratorRequest` on stdin and writes the
//! `CodeGeneratorResponse` to stdout.
//!
//! ```text
//! protoc --plugin=protoc-gen-protoforge --protoforge_out=src/gen \
//!     --protoforge_opt=forceLong=string,context=true acme/entity.proto
//! ```

use std::io::{Read, Write};

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut request = Vec::new();
    std::io::stdin()
        .read_to_end(&mut request)
        .context("reading CodeGeneratorRequest from stdin")?;
    let response = protoforge_build::generate_request_bytes(&request).context("decoding CodeGeneratorRequest")?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&response)
        .context("writing CodeGeneratorResponse")?;
    stdout.flush()?;
    Ok(())
}
