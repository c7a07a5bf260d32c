//! Namespace include/exclude matching and rename rewriting
//!
//! Patterns are whole-namespace strings (`<db>.<collection>`) where each
//! `*` matches any run of characters. A rename is a pair of patterns with
//! the same wildcard count; text captured by the n-th `*` of the source
//! pattern is substituted for the n-th `*` of the target pattern.

use super::errors::{CatalogError, CatalogResult};
use super::namespace::Namespace;

/// Matches one pattern against an input, returning wildcard captures.
///
/// Matching is leftmost: each `*` captures the shortest run that lets the
/// following literal segment match, which keeps rewrites deterministic.
fn match_captures(pattern: &str, input: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return if pattern == input { Some(Vec::new()) } else { None };
    }

    let mut captures = Vec::with_capacity(parts.len() - 1);
    let mut rest = input;

    // Leading literal
    rest = rest.strip_prefix(parts[0])?;

    for (i, part) in parts.iter().enumerate().skip(1) {
        let last = i == parts.len() - 1;
        if last {
            // Final wildcard captures everything up to the trailing literal
            let captured = rest.strip_suffix(part).map(|c| c.to_string())?;
            // An empty final literal means the wildcard runs to the end
            if part.is_empty() {
                captures.push(rest.to_string());
            } else {
                captures.push(captured);
            }
            rest = "";
        } else if part.is_empty() {
            // Adjacent wildcards: the earlier one captures nothing
            captures.push(String::new());
        } else {
            let at = rest.find(part)?;
            captures.push(rest[..at].to_string());
            rest = &rest[at + part.len()..];
        }
    }
    debug_assert!(rest.is_empty());
    Some(captures)
}

fn wildcard_count(pattern: &str) -> usize {
    pattern.bytes().filter(|&b| b == b'*').count()
}

/// An ordered set of namespace patterns.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMatcher {
    patterns: Vec<String>,
}

impl NamespaceMatcher {
    /// Creates a matcher from a pattern list. An empty list matches nothing.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if any pattern matches the namespace.
    pub fn matches(&self, ns: &Namespace) -> bool {
        let target = ns.to_string();
        self.patterns
            .iter()
            .any(|p| match_captures(p, &target).is_some())
    }
}

/// An ordered list of `(from, to)` rename pattern pairs.
///
/// The first matching pair wins. Namespaces matching no pair pass through
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRenamer {
    pairs: Vec<(String, String)>,
}

impl NamespaceRenamer {
    /// Builds a renamer, validating that each pair's wildcard counts agree.
    pub fn new(
        from: impl IntoIterator<Item = impl Into<String>>,
        to: impl IntoIterator<Item = impl Into<String>>,
    ) -> CatalogResult<Self> {
        let from: Vec<String> = from.into_iter().map(Into::into).collect();
        let to: Vec<String> = to.into_iter().map(Into::into).collect();
        if from.len() != to.len() {
            return Err(CatalogError::wildcard_mismatch(
                &from.join(","),
                &to.join(","),
            ));
        }
        for (f, t) in from.iter().zip(&to) {
            if wildcard_count(f) != wildcard_count(t) {
                return Err(CatalogError::wildcard_mismatch(f, t));
            }
        }
        Ok(Self {
            pairs: from.into_iter().zip(to).collect(),
        })
    }

    /// Returns true when no rename pairs are configured.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Applies the first matching rename, or returns the input unchanged.
    pub fn rename(&self, ns: &Namespace) -> CatalogResult<Namespace> {
        let source = ns.to_string();
        for (from, to) in &self.pairs {
            if let Some(captures) = match_captures(from, &source) {
                let mut rewritten = String::with_capacity(to.len());
                let mut capture_iter = captures.iter();
                for (i, part) in to.split('*').enumerate() {
                    if i > 0 {
                        // Pair construction validated the counts
                        rewritten.push_str(capture_iter.next().expect("wildcard count"));
                    }
                    rewritten.push_str(part);
                }
                return Namespace::parse(&rewritten);
            }
        }
        Ok(ns.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(s: &str) -> Namespace {
        Namespace::parse(s).unwrap()
    }

    #[test]
    fn test_literal_match() {
        let m = NamespaceMatcher::new(["test.users"]);
        assert!(m.matches(&ns("test.users")));
        assert!(!m.matches(&ns("test.users2")));
        assert!(!m.matches(&ns("prod.users")));
    }

    #[test]
    fn test_wildcard_match() {
        let m = NamespaceMatcher::new(["test.*"]);
        assert!(m.matches(&ns("test.users")));
        assert!(m.matches(&ns("test.system.buckets.weather")));
        assert!(!m.matches(&ns("prod.users")));

        let m = NamespaceMatcher::new(["*.users"]);
        assert!(m.matches(&ns("test.users")));
        assert!(m.matches(&ns("prod.users")));
        assert!(!m.matches(&ns("prod.accounts")));
    }

    #[test]
    fn test_empty_matcher_matches_nothing() {
        let m = NamespaceMatcher::default();
        assert!(m.is_empty());
        assert!(!m.matches(&ns("test.users")));
    }

    #[test]
    fn test_simple_rename() {
        let r = NamespaceRenamer::new(["test.users"], ["prod.people"]).unwrap();
        assert_eq!(r.rename(&ns("test.users")).unwrap(), ns("prod.people"));
        // Non-matching namespaces pass through
        assert_eq!(r.rename(&ns("test.other")).unwrap(), ns("test.other"));
    }

    #[test]
    fn test_wildcard_rename() {
        let r = NamespaceRenamer::new(["test.*"], ["archive.*"]).unwrap();
        assert_eq!(r.rename(&ns("test.users")).unwrap(), ns("archive.users"));
        assert_eq!(
            r.rename(&ns("test.a.b")).unwrap(),
            ns("archive.a.b"),
        );
    }

    #[test]
    fn test_multiple_wildcards() {
        let r = NamespaceRenamer::new(["*.pets_*"], ["*.animals_*"]).unwrap();
        assert_eq!(
            r.rename(&ns("db1.pets_dogs")).unwrap(),
            ns("db1.animals_dogs"),
        );
    }

    #[test]
    fn test_first_matching_pair_wins() {
        let r = NamespaceRenamer::new(
            ["test.special", "test.*"],
            ["out.first", "out.*"],
        )
        .unwrap();
        assert_eq!(r.rename(&ns("test.special")).unwrap(), ns("out.first"));
        assert_eq!(r.rename(&ns("test.other")).unwrap(), ns("out.other"));
    }

    #[test]
    fn test_wildcard_count_mismatch_rejected() {
        assert!(NamespaceRenamer::new(["a.*"], ["b.c"]).is_err());
        assert!(NamespaceRenamer::new(["a.*.*"], ["b.*"]).is_err());
        assert!(NamespaceRenamer::new(["a.*", "c.*"], ["b.*"]).is_err());
    }

    #[test]
    fn test_rename_preserves_newline_names() {
        let r = NamespaceRenamer::new(["src.*"], ["dst.*"]).unwrap();
        let renamed = r.rename(&Namespace::new("src", "a\nb")).unwrap();
        assert_eq!(renamed, Namespace::new("dst", "a\nb"));
    }
}
