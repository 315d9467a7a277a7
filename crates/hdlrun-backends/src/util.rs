//! Path and argument helpers shared by the backends

use std::path::{Path, PathBuf};

/// Escape a value so it survives as a single word inside a TCL script.
///
/// Backslash-escapes TCL metacharacters and whitespace, encodes newlines as
/// `\n`, and renders the empty string as `{}`.
pub fn as_tcl_value(value: &str) -> String {
    if value.is_empty() {
        return "{}".to_string();
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' | '{' | '}' | '[' | ']' | '$' | ';' | '"' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            c if c.is_ascii_whitespace() => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// TCL-escape every element of a list
pub fn tcl_values<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|v| as_tcl_value(v.as_ref())).collect()
}

/// TCL-escape a path, written with forward slashes
pub fn tcl_path(path: &Path) -> String {
    as_tcl_value(&posix_path(path))
}

/// Render a path with `/` separators, as vendor script dialects expect
pub fn posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Concatenate argument groups into one space separated command line,
/// skipping empty groups so no doubled spaces appear
pub fn add_args<I, S>(groups: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    groups
        .into_iter()
        .filter_map(|group| {
            let group = group.as_ref().trim();
            (!group.is_empty()).then(|| group.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `path` against `base` into an absolute path
pub fn absolute_path(base: &Path, path: &Path) -> PathBuf {
    let joined = base.join(path);
    std::path::absolute(&joined).unwrap_or(joined)
}

/// Resolve every path in `paths` against `base`
pub fn absolute_paths(base: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().map(|p| absolute_path(base, p)).collect()
}

/// Lossy string form of a path, as placed on a command line
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
