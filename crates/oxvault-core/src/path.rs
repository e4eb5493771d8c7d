//! Path helpers for volume paths.
//!
//! Volume paths are `/`-separated UTF-8 strings rooted at `/`. They never
//! touch the host filesystem, so these helpers work on plain strings instead
//! of `std::path`.

/// Volume path separator.
pub const SEPARATOR: char = '/';

/// Root of every volume.
pub const ROOT: &str = "/";

/// Normalize a volume path: leading `/`, no empty components, no trailing `/`.
///
/// `.` components are dropped. `..` is kept verbatim; backends decide whether
/// to reject it.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for component in path.split(SEPARATOR) {
        if component.is_empty() || component == "." {
            continue;
        }
        out.push(SEPARATOR);
        out.push_str(component);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// Parent of `path`; the parent of a top-level entry (and of the root) is `/`.
pub fn parent_path(path: &str) -> String {
    let stripped = if path.len() > 1 {
        path.strip_suffix(SEPARATOR).unwrap_or(path)
    } else {
        path
    };
    match stripped.rfind(SEPARATOR) {
        Some(0) | None => ROOT.to_string(),
        Some(index) => stripped[..index].to_string(),
    }
}

/// Join path components, inserting a separator only where one is missing.
///
/// Empty components are skipped.
pub fn path_join<S: AsRef<str>>(components: &[S]) -> String {
    let mut result = String::new();
    for component in components {
        let component = component.as_ref();
        if component.is_empty() {
            continue;
        }
        if !result.is_empty()
            && !result.ends_with(SEPARATOR)
            && !component.starts_with(SEPARATOR)
        {
            result.push(SEPARATOR);
        }
        if result.ends_with(SEPARATOR) && component.starts_with(SEPARATOR) {
            result.push_str(&component[1..]);
        } else {
            result.push_str(component);
        }
    }
    result
}

/// Path of `child` relative to `parent`, without a leading separator.
///
/// Returns `None` if `child` is not `parent` itself or one of its descendants.
pub fn relative_path<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    if !is_child_of(child, parent) {
        return None;
    }
    let rest = &child[parent.len()..];
    Some(rest.strip_prefix(SEPARATOR).unwrap_or(rest))
}

/// Whether `child` is `parent` or lies somewhere below it.
///
/// Unlike a plain prefix test, `/ab` is not a child of `/a`.
pub fn is_child_of(child: &str, parent: &str) -> bool {
    if parent == ROOT {
        return child.starts_with(SEPARATOR);
    }
    match child.strip_prefix(parent) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Last component of `path` (`""` for the root).
pub fn file_name(path: &str) -> &str {
    let stripped = path.trim_end_matches(SEPARATOR);
    stripped.rsplit(SEPARATOR).next().unwrap_or("")
}

const SIZE_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Human readable size using decimal (1000-based) units with one decimal.
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let mut group = 0;
    let mut threshold = 1000_u64;
    while group + 1 < SIZE_UNITS.len() && size >= threshold {
        group += 1;
        threshold = threshold.saturating_mul(1000);
    }
    let value = size as f64 / 1000_f64.powi(i32::try_from(group).unwrap_or(0));
    let formatted = format!("{value:.1}");
    let formatted = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{formatted} {}", SIZE_UNITS[group])
}
