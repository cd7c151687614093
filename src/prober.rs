//! Sequential probe across the mirror sources.
//!
//! Sources are tried strictly in priority order and the first accepted
//! branch wins. A source failing never aborts the probe; it becomes one
//! diagnostic line in the eventual not-found report.

use tracing::{info, warn};

use crate::error::ResolveError;
use crate::fetcher::RepoAccess;
use crate::sources::Source;
use crate::tree::Tree;
use crate::verify::{self, KeyCheck};

/// How a probe match was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The branch's key file contained the app id.
    Confirmed,
    /// No key file in the branch; accepted without confirmation.
    KeyFileMissing,
}

/// The first source whose branch was accepted, with its file listing.
#[derive(Debug)]
pub struct ProbeMatch {
    pub source: Source,
    pub tree: Tree,
    pub verification: Verification,
}

/// Walk `sources` in order looking for an acceptable `appid` branch.
pub async fn probe<A: RepoAccess>(
    access: &A,
    sources: &[Source],
    appid: &str,
) -> Result<ProbeMatch, ResolveError> {
    let mut diagnostics = Vec::new();

    for source in sources {
        info!("searching {} for branch {}", source.repo, appid);

        let tree = match access.fetch_tree(source, appid).await {
            Ok(tree) => tree,
            Err(err) => {
                warn!("{}: {}", source.repo, err);
                diagnostics.push(format!("[{}] {}", source.repo, err));
                continue;
            }
        };

        if tree.blob_count() == 0 {
            warn!("{}: branch {} has no files", source.repo, appid);
            diagnostics.push(format!("[{}] no files in branch {}", source.repo, appid));
            continue;
        }

        let Some(key_file) = tree.find_key_file() else {
            // Weak acceptance: nothing to verify against, take the match.
            warn!(
                "{}: no key file in branch {}, accepting unverified",
                source.repo, appid
            );
            return Ok(ProbeMatch {
                source: source.clone(),
                tree,
                verification: Verification::KeyFileMissing,
            });
        };
        let key_path = key_file.path.clone();

        match verify::check_key_file(access, source, appid, &key_path).await {
            KeyCheck::Confirmed => {
                info!("{}: verified via {}", source.repo, key_path);
                return Ok(ProbeMatch {
                    source: source.clone(),
                    tree,
                    verification: Verification::Confirmed,
                });
            }
            rejected => {
                let reason = rejected
                    .reject_reason()
                    .unwrap_or_else(|| "verification failed".to_string());
                warn!("{}: {}", source.repo, reason);
                diagnostics.push(format!("[{}] {}", source.repo, reason));
            }
        }
    }

    Err(ResolveError::NotFound {
        appid: appid.to_string(),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::tree::TreeEntry;
    use std::cell::Cell;
    use std::collections::HashMap;

    fn blob(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            entry_type: "blob".to_string(),
            size: Some(1),
        }
    }

    /// Canned per-repo behavior: an error message, or a tree plus file
    /// contents keyed by path.
    #[derive(Default)]
    struct FakeRepos {
        trees: HashMap<String, Result<Tree, String>>,
        files: HashMap<(String, String), Vec<u8>>,
        tree_calls: Cell<usize>,
    }

    impl FakeRepos {
        fn with_tree(mut self, repo: &str, entries: Vec<TreeEntry>) -> Self {
            self.trees
                .insert(repo.to_string(), Ok(Tree::new(entries)));
            self
        }

        fn with_error(mut self, repo: &str, reason: &str) -> Self {
            self.trees
                .insert(repo.to_string(), Err(reason.to_string()));
            self
        }

        fn with_file(mut self, repo: &str, path: &str, bytes: &[u8]) -> Self {
            self.files
                .insert((repo.to_string(), path.to_string()), bytes.to_vec());
            self
        }
    }

    impl RepoAccess for FakeRepos {
        async fn fetch_tree(&self, source: &Source, _appid: &str) -> Result<Tree, FetchError> {
            self.tree_calls.set(self.tree_calls.get() + 1);
            match self.trees.get(&source.repo) {
                Some(Ok(tree)) => Ok(tree.clone()),
                Some(Err(reason)) => Err(FetchError::Network(reason.clone())),
                None => Err(FetchError::Status(404, "Not Found".to_string())),
            }
        }

        async fn fetch_file(
            &self,
            source: &Source,
            _appid: &str,
            path: &str,
        ) -> Result<Vec<u8>, FetchError> {
            self.files
                .get(&(source.repo.clone(), path.to_string()))
                .cloned()
                .ok_or_else(|| FetchError::Status(404, "Not Found".to_string()))
        }
    }

    fn sources(repos: &[&str]) -> Vec<Source> {
        repos.iter().map(|r| Source::new(*r, *r)).collect()
    }

    #[tokio::test]
    async fn test_first_verified_source_wins() {
        let access = FakeRepos::default()
            .with_error("a/one", "connection refused")
            .with_error("a/two", "connection refused")
            .with_tree("a/three", vec![blob("game.manifest"), blob("key.vdf")])
            .with_file("a/three", "key.vdf", b"\"777\" {}")
            .with_tree("a/four", vec![blob("other.manifest")]);

        let sources = sources(&["a/one", "a/two", "a/three", "a/four"]);
        let matched = probe(&access, &sources, "777").await.unwrap();

        assert_eq!(matched.source.repo, "a/three");
        assert_eq!(matched.verification, Verification::Confirmed);
        // The probe stopped at the third source
        assert_eq!(access.tree_calls.get(), 3);
    }

    #[tokio::test]
    async fn test_diagnostics_count_matches_failures() {
        let access = FakeRepos::default()
            .with_error("a/one", "connection refused")
            .with_tree("a/two", vec![blob("game.manifest")]);

        let sources = sources(&["a/one", "a/two"]);
        let matched = probe(&access, &sources, "123").await.unwrap();
        assert_eq!(matched.source.repo, "a/two");
        // No key file: accepted, but flagged as unverified
        assert_eq!(matched.verification, Verification::KeyFileMissing);
    }

    #[tokio::test]
    async fn test_empty_branch_is_skipped() {
        let access = FakeRepos::default()
            .with_tree("a/one", vec![])
            .with_tree("a/two", vec![blob("game.manifest")]);

        let sources = sources(&["a/one", "a/two"]);
        let matched = probe(&access, &sources, "123").await.unwrap();
        assert_eq!(matched.source.repo, "a/two");
    }

    #[tokio::test]
    async fn test_verification_reject_continues_probing() {
        let access = FakeRepos::default()
            .with_tree("a/one", vec![blob("game.manifest"), blob("key.vdf")])
            .with_file("a/one", "key.vdf", b"\"999\" {}")
            .with_tree("a/two", vec![blob("game.manifest"), blob("key.vdf")])
            .with_file("a/two", "key.vdf", b"\"123\" {}");

        let sources = sources(&["a/one", "a/two"]);
        let matched = probe(&access, &sources, "123").await.unwrap();
        assert_eq!(matched.source.repo, "a/two");
    }

    #[tokio::test]
    async fn test_not_found_carries_all_diagnostics() {
        let access = FakeRepos::default()
            .with_error("a/one", "connection refused")
            .with_tree("a/two", vec![])
            .with_tree("a/three", vec![blob("key.vdf")])
            .with_file("a/three", "key.vdf", b"\"999\" {}");

        let sources = sources(&["a/one", "a/two", "a/three"]);
        let err = probe(&access, &sources, "123").await.unwrap_err();

        let ResolveError::NotFound { appid, diagnostics } = err else {
            panic!("expected NotFound");
        };
        assert_eq!(appid, "123");
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics[0].starts_with("[a/one]"));
        assert!(diagnostics[1].contains("no files"));
        assert!(diagnostics[2].contains("wrong branch"));
    }
}
