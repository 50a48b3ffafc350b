use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;
use crate::resilience::RateLimiter;

use super::{FileMetadata, ListPage, RemoteStore};

/// Passes every call through a shared [`RateLimiter`] before delegating.
pub struct RateLimitedStore<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S: RemoteStore> RateLimitedStore<S> {
    pub fn new(inner: S, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RemoteStore> RemoteStore for RateLimitedStore<S> {
    fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.limiter.acquire();
        self.inner.list_children(folder_id, page_token)
    }

    fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<FileMetadata>, StoreError> {
        self.limiter.acquire();
        self.inner.find_folder(name, parent_id)
    }

    fn get_media(&self, file_id: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        self.limiter.acquire();
        self.inner.get_media(file_id)
    }

    fn create_media(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        self.limiter.acquire();
        self.inner.create_media(parent_id, name, local_path)
    }
}
