use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::io::Result;
use std::path::{Path, PathBuf};

/// A node in the module tree, one per path segment of a generated file.
struct ModuleNode {
    /// Generated file (relative to the output directory) this module includes.
    include_file: Option<String>,
    /// Child modules keyed by segment name, sorted via BTreeMap.
    children: BTreeMap<String, ModuleNode>,
}

/// How `include!` paths are spelled.
enum IncludeBase {
    /// `concat!(env!("OUT_DIR"), "/a/b.rs")`
    OutDirEnv,
    /// Absolute path literal.
    Absolute(PathBuf),
}

impl IncludeBase {
    fn include_expr(&self, file: &str) -> String {
        match self {
            IncludeBase::OutDirEnv => format!("concat!(env!(\"OUT_DIR\"), \"/{file}\")"),
            IncludeBase::Absolute(out_dir) => {
                format!("{:?}", out_dir.join(file).to_string_lossy())
            }
        }
    }
}

impl ModuleNode {
    fn new() -> Self {
        Self {
            include_file: None,
            children: BTreeMap::new(),
        }
    }

    fn insert(&mut self, segments: &[&str], file: &str) {
        let Some((first, rest)) = segments.split_first() else {
            self.include_file = Some(file.to_string());
            return;
        };
        self.children
            .entry(first.to_string())
            .or_insert_with(ModuleNode::new)
            .insert(rest, file);
    }

    fn render(&self, out: &mut String, depth: usize, base: &IncludeBase) -> std::fmt::Result {
        let indent = "    ".repeat(depth);
        for (name, child) in &self.children {
            writeln!(out, "{indent}pub mod {name} {{")?;
            if let Some(file) = &child.include_file {
                writeln!(out, "{indent}    include!({});", base.include_expr(file))?;
            }
            child.render(out, depth + 1, base)?;
            writeln!(out, "{indent}}}")?;
        }
        Ok(())
    }
}

/// Render the include file for `files` (generated names such as `a/b.rs`).
///
/// Modules nest by path segment, so `a/b.rs` lands in `pub mod a { pub mod b
/// { .. } }`, matching the `super::` paths generated code uses for
/// cross-file references.
pub(crate) fn render(files: &[String], out_dir: &Path, from_out_dir_env: bool) -> Result<String> {
    let base = if from_out_dir_env {
        IncludeBase::OutDirEnv
    } else {
        IncludeBase::Absolute(std::fs::canonicalize(out_dir)?)
    };

    let mut root = ModuleNode::new();
    for file in files {
        let Some(stem) = file.strip_suffix(".rs") else {
            continue;
        };
        let segments: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            continue;
        }
        root.insert(&segments, file);
    }

    let mut output = String::from("// @generated by protoforge-build\n");
    root.render(&mut output, 0, &base).map_err(std::io::Error::other)?;
    Ok(output)
}

/// Write the include file `include_file_name` into `out_dir`.
pub(crate) fn generate(
    include_file_name: &str,
    out_dir: &Path,
    files: &[String],
    from_out_dir_env: bool,
) -> Result<()> {
    let output = render(files, out_dir, from_out_dir_env)?;
    std::fs::write(out_dir.join(include_file_name), output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_env(files: &[&str]) -> String {
        let files: Vec<String> = files.iter().map(|f| f.to_string()).collect();
        render(&files, Path::new("."), true).unwrap()
    }

    #[test]
    fn top_level_files_become_sibling_modules() {
        let out = render_env(&["billing.rs", "audit.rs"]);
        assert!(out.contains("pub mod audit {\n    include!(concat!(env!(\"OUT_DIR\"), \"/audit.rs\"));\n}"));
        assert!(out.contains("pub mod billing {"));
    }

    #[test]
    fn package_directories_nest() {
        let out = render_env(&["acme/entity.rs", "acme/shapes.rs"]);
        assert_eq!(out.matches("pub mod acme {").count(), 1);
        assert!(out.contains("    pub mod entity {"));
        assert!(out.contains("        include!(concat!(env!(\"OUT_DIR\"), \"/acme/shapes.rs\"));"));
    }

    #[test]
    fn module_can_include_a_file_and_hold_children() {
        let out = render_env(&["acme.rs", "acme/v1.rs"]);
        let parent = out.find("/acme.rs").unwrap();
        let child = out.find("pub mod v1 {").unwrap();
        assert!(parent < child);
    }

    #[test]
    fn modules_are_sorted_by_name() {
        let out = render_env(&["zeta.rs", "alpha.rs", "middle.rs"]);
        let positions: Vec<usize> = ["alpha", "middle", "zeta"]
            .iter()
            .map(|name| out.find(&format!("pub mod {name} ")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn non_rust_names_are_ignored() {
        let out = render_env(&["notes.txt", "/.rs"]);
        assert!(!out.contains("pub mod"));
    }

    #[test]
    fn explicit_out_dir_writes_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("acme")).unwrap();
        std::fs::write(dir.path().join("acme/entity.rs"), "").unwrap();

        generate("mod.rs", dir.path(), &["acme/entity.rs".to_string()], false).unwrap();
        let out = std::fs::read_to_string(dir.path().join("mod.rs")).unwrap();
        let entity = std::fs::canonicalize(dir.path()).unwrap().join("acme/entity.rs");
        assert!(out.contains(&format!("include!({:?});", entity.to_string_lossy())));
        assert!(!out.contains("OUT_DIR"));
    }
}
