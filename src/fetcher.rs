//! Tree and file fetching with cache and proxy fallback.
//!
//! Resolution order for a tree: unexpired cache entry, then the direct
//! API, then the proxy (when configured). Files skip the cache and go
//! direct-then-proxy. A rate-limited direct call is a fallback trigger,
//! not a hard failure.

use std::future::Future;

use tracing::{debug, warn};

use crate::cache::TreeCache;
use crate::error::FetchError;
use crate::sources::Source;
use crate::transport::RepoTransport;
use crate::tree::Tree;

/// Read access to a mirror repository, as the prober, verifier and
/// downloader consume it. [`TreeFetcher`] is the production
/// implementation; tests substitute fakes.
pub trait RepoAccess {
    /// Fetch the manifest branch tree for `appid` from `source`.
    fn fetch_tree(
        &self,
        source: &Source,
        appid: &str,
    ) -> impl Future<Output = Result<Tree, FetchError>>;

    /// Fetch one file's bytes from `source`'s `appid` branch.
    fn fetch_file(
        &self,
        source: &Source,
        appid: &str,
        path: &str,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// Production fetcher: direct transport, optional proxy, optional cache.
pub struct TreeFetcher<D, P> {
    direct: D,
    proxy: Option<P>,
    cache: Option<TreeCache>,
}

impl<D: RepoTransport, P: RepoTransport> TreeFetcher<D, P> {
    pub fn new(direct: D, proxy: Option<P>, cache: Option<TreeCache>) -> Self {
        Self {
            direct,
            proxy,
            cache,
        }
    }

    async fn tree_via_transports(&self, repo: &str, branch: &str) -> Result<Tree, FetchError> {
        match self.direct.fetch_tree(repo, branch).await {
            Ok(tree) => Ok(tree),
            Err(err) => {
                let Some(proxy) = &self.proxy else {
                    return Err(err);
                };
                match &err {
                    FetchError::RateLimited => {
                        debug!("{}: rate limited, trying the proxy", repo);
                    }
                    other => {
                        debug!("{}: direct listing failed ({}), trying the proxy", repo, other);
                    }
                }
                proxy.fetch_tree(repo, branch).await
            }
        }
    }
}

impl<D: RepoTransport, P: RepoTransport> RepoAccess for TreeFetcher<D, P> {
    async fn fetch_tree(&self, source: &Source, appid: &str) -> Result<Tree, FetchError> {
        if let Some(cache) = &self.cache {
            match cache.get(&source.repo, appid) {
                Ok(Some(hit)) => return Ok(hit.tree),
                Ok(None) => {}
                Err(err) => warn!("tree cache read failed: {err:#}"),
            }
        }

        let tree = self.tree_via_transports(&source.repo, appid).await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(&source.repo, appid, appid, &tree) {
                warn!("tree cache write failed: {err:#}");
            }
        }

        Ok(tree)
    }

    async fn fetch_file(&self, source: &Source, appid: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        match self.direct.fetch_file(&source.repo, appid, path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                let Some(proxy) = &self.proxy else {
                    return Err(err);
                };
                debug!(
                    "{}: direct download of {} failed ({}), trying the proxy",
                    source.repo, path, err
                );
                proxy.fetch_file(&source.repo, appid, path).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeEntry;
    use std::cell::Cell;

    fn tree_with(paths: &[&str]) -> Tree {
        Tree::new(
            paths
                .iter()
                .map(|p| TreeEntry {
                    path: p.to_string(),
                    entry_type: "blob".to_string(),
                    size: Some(1),
                })
                .collect(),
        )
    }

    fn source() -> Source {
        Source::new("Test", "test/repo")
    }

    /// Transport that answers from canned results and counts calls.
    struct FakeTransport {
        tree_calls: Cell<usize>,
        file_calls: Cell<usize>,
        tree_result: fn() -> Result<Tree, FetchError>,
        file_result: fn() -> Result<Vec<u8>, FetchError>,
    }

    impl FakeTransport {
        fn new(
            tree_result: fn() -> Result<Tree, FetchError>,
            file_result: fn() -> Result<Vec<u8>, FetchError>,
        ) -> Self {
            Self {
                tree_calls: Cell::new(0),
                file_calls: Cell::new(0),
                tree_result,
                file_result,
            }
        }
    }

    impl RepoTransport for FakeTransport {
        async fn fetch_tree(&self, _repo: &str, _branch: &str) -> Result<Tree, FetchError> {
            self.tree_calls.set(self.tree_calls.get() + 1);
            (self.tree_result)()
        }

        async fn fetch_file(
            &self,
            _repo: &str,
            _branch: &str,
            _path: &str,
        ) -> Result<Vec<u8>, FetchError> {
            self.file_calls.set(self.file_calls.get() + 1);
            (self.file_result)()
        }
    }

    fn ok_tree() -> Result<Tree, FetchError> {
        Ok(tree_with(&["direct.manifest"]))
    }

    fn proxy_tree() -> Result<Tree, FetchError> {
        Ok(tree_with(&["proxy.manifest"]))
    }

    fn rate_limited_tree() -> Result<Tree, FetchError> {
        Err(FetchError::RateLimited)
    }

    fn not_found_tree() -> Result<Tree, FetchError> {
        Err(FetchError::Status(404, "Not Found".to_string()))
    }

    fn ok_file() -> Result<Vec<u8>, FetchError> {
        Ok(b"direct".to_vec())
    }

    fn proxy_file() -> Result<Vec<u8>, FetchError> {
        Ok(b"proxy".to_vec())
    }

    fn failed_file() -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Network("connection reset".to_string()))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_transports() {
        let cache = TreeCache::open_in_memory().unwrap();
        let cached = tree_with(&["cached.manifest"]);
        cache.put("test/repo", "123", "123", &cached).unwrap();

        let direct = FakeTransport::new(ok_tree, ok_file);
        let fetcher: TreeFetcher<_, FakeTransport> = TreeFetcher::new(direct, None, Some(cache));

        let tree = fetcher.fetch_tree(&source(), "123").await.unwrap();
        assert_eq!(tree.tree[0].path, "cached.manifest");
        assert_eq!(fetcher.direct.tree_calls.get(), 0);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches_and_overwrites() {
        let cache = TreeCache::open_in_memory().unwrap();
        cache
            .put("test/repo", "123", "123", &tree_with(&["stale.manifest"]))
            .unwrap();
        cache.force_expire_all().unwrap();

        let direct = FakeTransport::new(ok_tree, ok_file);
        let fetcher: TreeFetcher<_, FakeTransport> = TreeFetcher::new(direct, None, Some(cache));

        let tree = fetcher.fetch_tree(&source(), "123").await.unwrap();
        assert_eq!(tree.tree[0].path, "direct.manifest");
        assert_eq!(fetcher.direct.tree_calls.get(), 1);

        // The fresh tree replaced the stale row
        let hit = fetcher
            .cache
            .as_ref()
            .unwrap()
            .get("test/repo", "123")
            .unwrap()
            .unwrap();
        assert_eq!(hit.tree.tree[0].path, "direct.manifest");
    }

    #[tokio::test]
    async fn test_rate_limit_falls_through_to_proxy() {
        let direct = FakeTransport::new(rate_limited_tree, ok_file);
        let proxy = FakeTransport::new(proxy_tree, proxy_file);
        let fetcher = TreeFetcher::new(direct, Some(proxy), None);

        let tree = fetcher.fetch_tree(&source(), "123").await.unwrap();
        assert_eq!(tree.tree[0].path, "proxy.manifest");
        assert_eq!(fetcher.direct.tree_calls.get(), 1);
        assert_eq!(fetcher.proxy.as_ref().unwrap().tree_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_direct_failure_falls_through_to_proxy() {
        let direct = FakeTransport::new(not_found_tree, ok_file);
        let proxy = FakeTransport::new(proxy_tree, proxy_file);
        let fetcher = TreeFetcher::new(direct, Some(proxy), None);

        let tree = fetcher.fetch_tree(&source(), "123").await.unwrap();
        assert_eq!(tree.tree[0].path, "proxy.manifest");
    }

    #[tokio::test]
    async fn test_direct_failure_without_proxy_is_final() {
        let direct = FakeTransport::new(not_found_tree, ok_file);
        let fetcher: TreeFetcher<_, FakeTransport> = TreeFetcher::new(direct, None, None);

        let err = fetcher.fetch_tree(&source(), "123").await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404, _)));
    }

    #[tokio::test]
    async fn test_file_fallback() {
        let direct = FakeTransport::new(ok_tree, failed_file);
        let proxy = FakeTransport::new(proxy_tree, proxy_file);
        let fetcher = TreeFetcher::new(direct, Some(proxy), None);

        let bytes = fetcher
            .fetch_file(&source(), "123", "game.manifest")
            .await
            .unwrap();
        assert_eq!(bytes, b"proxy");
        assert_eq!(fetcher.direct.file_calls.get(), 1);
        assert_eq!(fetcher.proxy.as_ref().unwrap().file_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_successful_fetch_populates_cache() {
        let cache = TreeCache::open_in_memory().unwrap();
        let direct = FakeTransport::new(ok_tree, ok_file);
        let fetcher: TreeFetcher<_, FakeTransport> = TreeFetcher::new(direct, None, Some(cache));

        fetcher.fetch_tree(&source(), "123").await.unwrap();

        // Second call is served from the cache
        fetcher.fetch_tree(&source(), "123").await.unwrap();
        assert_eq!(fetcher.direct.tree_calls.get(), 1);
    }
}
