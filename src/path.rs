//! Path splitting for route matching.

/// Splits a slash-delimited path into its components.
///
/// The root path yields a single empty component, and a trailing slash on
/// any other path is dropped first, so `/a/` and `/a` split identically:
///
/// ```rust
/// use mercury::split_path;
///
/// assert_eq!(split_path("/"), [""]);
/// assert_eq!(split_path("/hello/world"), ["", "hello", "world"]);
/// assert_eq!(split_path("/hello/world/"), ["", "hello", "world"]);
/// ```
pub fn split_path(path: &str) -> Vec<String> {
    // A naive split of "/" gives ["", ""], which would never match a root
    // pattern of the same shape as every other path.
    if path == "/" {
        return vec![String::new()];
    }
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        assert_eq!(split_path("/hello/world"), ["", "hello", "world"]);
    }

    #[test]
    fn root_is_single_empty_component() {
        assert_eq!(split_path("/"), [""]);
    }

    #[test]
    fn trailing_slash_is_ignored() {
        for p in ["/a", "/a/b", "/a/:b/c", ""] {
            let with_slash = format!("{p}/");
            assert_eq!(split_path(p), split_path(&with_slash), "path {p:?}");
        }
    }

    #[test]
    fn empty_path_matches_root() {
        assert_eq!(split_path(""), split_path("/"));
    }
}
