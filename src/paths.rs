//! Glob resolution for the binary and symbol inputs
//!
//! Relative patterns are resolved against the pipeline's working directory.
//! With `continue_on_error`, a pattern that matches nothing (or too much) is
//! reported as a warning and resolves to nothing instead of failing the task.

use crate::error::{Result, SymbolsError};
use crate::types::SymbolType;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves user-supplied path patterns to existing files and folders
#[derive(Clone, Debug)]
pub struct PathResolver {
    base_dir: PathBuf,
    continue_on_error: bool,
    pack_parent_folder: bool,
}

impl PathResolver {
    /// Resolve relative patterns against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            continue_on_error: false,
            pack_parent_folder: false,
        }
    }

    /// Warn instead of failing when a pattern does not resolve
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Replace every match by its parent folder
    pub fn pack_parent_folder(mut self, enabled: bool) -> Self {
        self.pack_parent_folder = enabled;
        self
    }

    /// Resolve a pattern that must match exactly one entry
    pub fn resolve_single(&self, pattern: &str) -> Result<Option<PathBuf>> {
        if pattern.trim().is_empty() {
            return Ok(None);
        }

        let matches = self.find_matches(pattern)?;
        match matches.len() {
            0 => self.unresolved(SymbolsError::NotFound {
                pattern: pattern.to_string(),
            }),
            1 => {
                let found = matches.into_iter().next().map(|p| self.maybe_parent(p));
                debug!(pattern, resolved = ?found, "resolved single path");
                Ok(found)
            }
            count => self.unresolved(SymbolsError::MultipleMatches {
                pattern: pattern.to_string(),
                count,
            }),
        }
    }

    /// Resolve a pattern that may match several entries
    pub fn resolve_all(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        if pattern.trim().is_empty() {
            return Ok(Vec::new());
        }

        let matches = self.find_matches(pattern)?;
        if matches.is_empty() {
            return self.unresolved(SymbolsError::NotFound {
                pattern: pattern.to_string(),
            });
        }

        let resolved: Vec<PathBuf> = matches
            .into_iter()
            .map(|p| self.maybe_parent(p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(pattern, count = resolved.len(), "resolved paths");
        Ok(resolved)
    }

    /// Ensure `path` exists
    pub fn check_path(&self, path: &Path) -> Result<Option<PathBuf>> {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        self.unresolved(SymbolsError::NotFound {
            pattern: path.display().to_string(),
        })
    }

    /// Expand a symbols pattern into the paths to upload
    ///
    /// Apple and Breakpad symbols may span several folders; every other kind
    /// resolves to one file or folder.
    pub fn expand_symbols_paths(
        &self,
        symbol_type: SymbolType,
        pattern: &str,
    ) -> Result<Vec<PathBuf>> {
        let candidates = if symbol_type.allows_multiple_paths() {
            self.resolve_all(pattern)?
        } else {
            self.resolve_single(pattern)?.into_iter().collect()
        };

        let mut paths = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(path) = self.check_path(&candidate)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn find_matches(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            self.base_dir.join(pattern).to_string_lossy().into_owned()
        };

        let entries = glob::glob(&full).map_err(|e| SymbolsError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => debug!(error = %e, "skipping unreadable glob entry"),
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn maybe_parent(&self, path: PathBuf) -> PathBuf {
        if !self.pack_parent_folder {
            return path;
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => path,
        }
    }

    fn unresolved<T: Default>(&self, error: SymbolsError) -> Result<T> {
        if self.continue_on_error {
            warn!("{error}");
            Ok(T::default())
        } else {
            Err(error.into())
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out/ios/App.dSYM")).unwrap();
        std::fs::create_dir_all(dir.path().join("out/ios/Ext.dSYM")).unwrap();
        std::fs::create_dir_all(dir.path().join("out/android")).unwrap();
        std::fs::write(dir.path().join("out/android/app-release.apk"), "apk").unwrap();
        std::fs::write(dir.path().join("out/android/mapping.txt"), "map").unwrap();
        dir
    }

    #[test]
    fn single_pattern_resolves_relative_to_base() {
        let dir = workspace();
        let resolver = PathResolver::new(dir.path());

        let app = resolver.resolve_single("out/**/*.apk").unwrap();
        assert_eq!(app, Some(dir.path().join("out/android/app-release.apk")));
    }

    #[test]
    fn single_pattern_with_no_match_fails_unless_continuing() {
        let dir = workspace();

        let err = PathResolver::new(dir.path())
            .resolve_single("*.ipa")
            .unwrap_err();
        assert!(matches!(err, Error::Symbols(SymbolsError::NotFound { .. })));

        let none = PathResolver::new(dir.path())
            .continue_on_error(true)
            .resolve_single("*.ipa")
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn single_pattern_with_several_matches_is_rejected() {
        let dir = workspace();
        let err = PathResolver::new(dir.path())
            .resolve_single("out/ios/*.dSYM")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Symbols(SymbolsError::MultipleMatches { count: 2, .. })
        ));
    }

    #[test]
    fn resolve_all_returns_sorted_matches() {
        let dir = workspace();
        let paths = PathResolver::new(dir.path())
            .resolve_all("out/ios/*.dSYM")
            .unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("out/ios/App.dSYM"),
                dir.path().join("out/ios/Ext.dSYM")
            ]
        );
    }

    #[test]
    fn pack_parent_folder_collapses_to_parents() {
        let dir = workspace();
        let paths = PathResolver::new(dir.path())
            .pack_parent_folder(true)
            .resolve_all("out/ios/*.dSYM")
            .unwrap();
        assert_eq!(paths, vec![dir.path().join("out/ios")]);
    }

    #[test]
    fn pack_parent_folder_drops_interleaved_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out/x");
        std::fs::create_dir_all(root.join("f2")).unwrap();
        std::fs::write(root.join("f1"), "1").unwrap();
        std::fs::write(root.join("f2/g"), "g").unwrap();
        std::fs::write(root.join("f3"), "3").unwrap();

        let paths = PathResolver::new(dir.path())
            .pack_parent_folder(true)
            .resolve_all("out/x/**/*")
            .unwrap();
        assert_eq!(paths, vec![root.clone(), root.join("f2")]);
    }

    #[test]
    fn empty_pattern_resolves_to_nothing() {
        let dir = workspace();
        let resolver = PathResolver::new(dir.path());
        assert_eq!(resolver.resolve_single("").unwrap(), None);
        assert!(resolver.resolve_all("  ").unwrap().is_empty());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let dir = workspace();
        let err = PathResolver::new(dir.path())
            .resolve_all("out/[")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Symbols(SymbolsError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn symbols_expansion_depends_on_type() {
        let dir = workspace();
        let resolver = PathResolver::new(dir.path());

        let apple = resolver
            .expand_symbols_paths(SymbolType::Apple, "out/ios/*.dSYM")
            .unwrap();
        assert_eq!(apple.len(), 2);

        let proguard = resolver
            .expand_symbols_paths(SymbolType::AndroidProguard, "out/android/mapping.txt")
            .unwrap();
        assert_eq!(proguard, vec![dir.path().join("out/android/mapping.txt")]);

        let err = resolver
            .expand_symbols_paths(SymbolType::Uwp, "out/ios/*.dSYM")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Symbols(SymbolsError::MultipleMatches { .. })
        ));
    }

    #[test]
    fn check_path_honors_continue_on_error() {
        let dir = workspace();
        let missing = dir.path().join("gone");

        assert!(PathResolver::new(dir.path()).check_path(&missing).is_err());
        assert_eq!(
            PathResolver::new(dir.path())
                .continue_on_error(true)
                .check_path(&missing)
                .unwrap(),
            None
        );
    }
}
