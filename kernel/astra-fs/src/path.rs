//! Path canonicalization and tokenization, grounded on `vfs_tokenize` and
//! `canonicalize_path`.

use alloc::string::String;
use alloc::vec::Vec;

/// The path delimiter (`PATH_DELIMITER`).
pub const DELIMITER: char = '/';

/// Splits a path into its non-empty components, ignoring repeated or
/// trailing delimiters. Mirrors `vfs_tokenize`'s splitting, minus the
/// in-place `NUL`-splicing (Rust's `str` doesn't need that trick).
#[must_use]
pub fn components(path: &str) -> Vec<&str> {
    path.split(DELIMITER).filter(|c| !c.is_empty()).collect()
}

/// Whether `path` is absolute (begins with the delimiter).
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(DELIMITER)
}

/// Converts a possibly-relative path to an absolute, canonical one: joins
/// relative paths onto `cwd`, then walks components honoring `.` (skip) and
/// `..` (pop the last resolved component, or no-op at the root). The result
/// has no trailing delimiter except the root path itself (`"/"`).
///
/// Mirrors `canonicalize_path`.
#[must_use]
pub fn canonicalize(cwd: &str, relpath: &str) -> String {
    let joined;
    let source = if is_absolute(relpath) {
        relpath
    } else {
        joined = alloc::format!("{cwd}{DELIMITER}{relpath}");
        joined.as_str()
    };

    let mut resolved: Vec<&str> = Vec::new();
    for component in components(source) {
        match component {
            "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    if resolved.is_empty() {
        String::from("/")
    } else {
        let mut out = String::new();
        for component in resolved {
            out.push(DELIMITER);
            out.push_str(component);
        }
        out
    }
}

/// Finds the longest mount-table key that is a prefix of `path` on a
/// component boundary (so `/dev` matches `/dev/null` but not `/device`).
/// Used by the VFS's mount-aware path walk.
#[must_use]
pub fn longest_prefix_match<'a>(
    path: &str,
    candidates: impl Iterator<Item = &'a str>,
) -> Option<&'a str> {
    let path_components = components(path);
    candidates
        .filter(|candidate| {
            let candidate_components = components(candidate);
            candidate_components.len() <= path_components.len()
                && candidate_components
                    .iter()
                    .zip(path_components.iter())
                    .all(|(a, b)| a == b)
        })
        .max_by_key(|candidate| components(candidate).len())
}

/// Strips a mount prefix from `path`, returning the remainder with no
/// leading delimiter (empty if `path == mount_path`).
#[must_use]
pub fn strip_mount_prefix<'a>(path: &'a str, mount_path: &str) -> &'a str {
    let rest = &path[mount_path.len()..];
    rest.trim_start_matches(DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_relpath_ignores_cwd() {
        assert_eq!(canonicalize("/home/user", "/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn relative_path_joins_cwd() {
        assert_eq!(canonicalize("/home/user", "docs/a.txt"), "/home/user/docs/a.txt");
    }

    #[test]
    fn dot_components_are_skipped() {
        assert_eq!(canonicalize("/a/b", "./c/./d"), "/a/b/c/d");
    }

    #[test]
    fn dotdot_pops_a_component() {
        assert_eq!(canonicalize("/a/b/c", "../d"), "/a/b/d");
    }

    #[test]
    fn dotdot_past_root_is_a_no_op() {
        assert_eq!(canonicalize("/", "../../x"), "/x");
    }

    #[test]
    fn repeated_delimiters_collapse() {
        assert_eq!(canonicalize("/", "a//b///c"), "/a/b/c");
    }

    #[test]
    fn longest_prefix_wins_over_shorter_mount() {
        let mounts = ["/", "/mnt", "/mnt/usb"];
        assert_eq!(
            longest_prefix_match("/mnt/usb/file.txt", mounts.into_iter()),
            Some("/mnt/usb")
        );
    }

    #[test]
    fn prefix_match_respects_component_boundary() {
        let mounts = ["/", "/dev"];
        assert_eq!(longest_prefix_match("/device/foo", mounts.into_iter()), Some("/"));
    }

    #[test]
    fn strip_prefix_drops_leading_delimiter() {
        assert_eq!(strip_mount_prefix("/mnt/usb/file.txt", "/mnt/usb"), "file.txt");
        assert_eq!(strip_mount_prefix("/mnt/usb", "/mnt/usb"), "");
    }
}
