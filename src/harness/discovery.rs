use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::directives::DirectiveSet;
use crate::errors::RigError;

/// Recursively collects script files under `root` whose extension is one of
/// `extensions`. Sorted, so suites run in a stable order.
pub fn discover_scripts(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, RigError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RigError::Io {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if has_extension(path, extensions) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    tracing::debug!(root = %root.display(), count = files.len(), "discovered scripts");
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.trim_start_matches('.') == ext))
}

/// `path` relative to `root`, with forward slashes.
pub fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let name = relative.display().to_string().replace('\\', "/");
    if name.is_empty() {
        path.display().to_string()
    } else {
        name
    }
}

/// Set when `filter` excludes the script named `relative`.
pub fn filtered_out(relative: &str, filter: Option<&Regex>) -> Option<String> {
    let filter = filter?;
    (!filter.is_match(relative)).then(|| format!("filtered out by /{}/", filter.as_str()))
}

/// Why a discovered script is not run, if it is not.
pub fn skip_reason(directives: &DirectiveSet, relative: &str, filter: Option<&Regex>) -> Option<String> {
    if let Some(reason) = filtered_out(relative, filter) {
        return Some(reason);
    }
    if directives.is_subtest() {
        return Some("marked @subtest".to_string());
    }
    if !directives.is_test() {
        return Some("no @test directive".to_string());
    }
    None
}
