//! Client for the external build-cache service that resolves a `build_url`
//! into a locally staged build.

use async_trait::async_trait;

/// Opaque bundle describing a resolved build. The worker reads only the
/// fields it needs to install and log; everything else is carried through
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildMetadata {
    /// Repository name the build was produced from.
    pub tree: String,
    /// Build timestamp, epoch seconds with fractional precision.
    pub blddate: f64,
    /// Local directory containing the staged `build.apk`.
    pub cache_build_dir: String,
}

/// Outcome of a [`BuildCacheClient::get`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildFetch {
    Success(BuildMetadata),
    Failure(String),
}

/// External collaborator that resolves a `build_url` to staged build bytes.
/// Must be safe to call repeatedly for the same URL.
#[async_trait]
pub trait BuildCacheClient: Send + Sync {
    async fn get(&self, build_url: &str, enable_unittests: bool) -> BuildFetch;
}

/// Placeholder [`BuildCacheClient`] for deployments with no wired-up build
/// cache: treats every request as a success, synthesizing metadata from the
/// requested URL. A real binding would replace this with one that actually
/// talks to the build cache service.
pub struct StubBuildCacheClient;

#[async_trait]
impl BuildCacheClient for StubBuildCacheClient {
    async fn get(&self, build_url: &str, enable_unittests: bool) -> BuildFetch {
        log::debug!("build cache stub: get({build_url}, unittests={enable_unittests})");
        BuildFetch::Success(BuildMetadata {
            tree: "unknown".to_string(),
            blddate: 0.0,
            cache_build_dir: "/tmp/autophoned/build".to_string(),
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted [`BuildCacheClient`]: queue responses, or default to a
    /// synthetic success built from the requested URL.
    #[derive(Default)]
    pub struct MockBuildCacheClient {
        responses: Mutex<VecDeque<BuildFetch>>,
        requests: Mutex<Vec<(String, bool)>>,
    }

    impl MockBuildCacheClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue(&self, response: BuildFetch) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn requests(&self) -> Vec<(String, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BuildCacheClient for MockBuildCacheClient {
        async fn get(&self, build_url: &str, enable_unittests: bool) -> BuildFetch {
            self.requests
                .lock()
                .unwrap()
                .push((build_url.to_string(), enable_unittests));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    BuildFetch::Success(BuildMetadata {
                        tree: "default".to_string(),
                        blddate: 0.0,
                        cache_build_dir: "/tmp/build".to_string(),
                    })
                })
        }
    }
}
