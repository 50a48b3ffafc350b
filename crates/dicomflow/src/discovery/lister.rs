use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, StoreError};
use crate::remote::{FileMetadata, ListPage, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingErrors {
    Skip,
    Abort,
}

/// Enumerates files below a folder, breadth-first, up to a result cap.
pub struct RecursiveLister<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> RecursiveLister<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Breadth-first walk from `root_folder_id`.
    ///
    /// Every folder id is listed at most once, so duplicate parent edges and
    /// cycles terminate. Collection stops as soon as `max_results` files have
    /// been gathered. A folder whose listing fails is logged and skipped.
    pub fn list_recursive(&self, root_folder_id: &str, max_results: usize) -> Vec<FileMetadata> {
        let listed = self.walk(
            root_folder_id,
            max_results,
            |folder_id, token| self.store.list_children(folder_id, token),
            ListingErrors::Skip,
        );
        // Skipping walks never return an error.
        listed.unwrap_or_default()
    }

    /// Same walk as [`Self::list_recursive`], but the first failed listing
    /// aborts it. Pages are fetched through `list_page`, which lets callers
    /// add retries or a circuit breaker around the store.
    pub fn list_recursive_strict<F>(
        &self,
        root_folder_id: &str,
        max_results: usize,
        list_page: F,
    ) -> Result<Vec<FileMetadata>, DiscoveryError>
    where
        F: FnMut(&str, Option<&str>) -> Result<ListPage, StoreError>,
    {
        self.walk(root_folder_id, max_results, list_page, ListingErrors::Abort)
    }

    fn walk<F>(
        &self,
        root_folder_id: &str,
        max_results: usize,
        mut list_page: F,
        on_error: ListingErrors,
    ) -> Result<Vec<FileMetadata>, DiscoveryError>
    where
        F: FnMut(&str, Option<&str>) -> Result<ListPage, StoreError>,
    {
        let mut files = Vec::new();
        if max_results == 0 {
            return Ok(files);
        }

        let mut queue: VecDeque<String> = VecDeque::from([root_folder_id.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(folder_id) = queue.pop_front() {
            if !visited.insert(folder_id.clone()) {
                continue;
            }

            let mut page_token: Option<String> = None;
            loop {
                let page = match list_page(&folder_id, page_token.as_deref()) {
                    Ok(page) => page,
                    Err(source) if on_error == ListingErrors::Abort => {
                        return Err(DiscoveryError::Listing { folder_id, source });
                    }
                    Err(e) => {
                        warn!(folder_id = %folder_id, error = %e, "Skipping folder after listing error");
                        break;
                    }
                };

                for item in page.items {
                    if item.is_folder() {
                        if !visited.contains(&item.id) {
                            queue.push_back(item.id);
                        }
                    } else {
                        files.push(item);
                        if files.len() >= max_results {
                            info!(
                                count = files.len(),
                                folders_visited = visited.len(),
                                "Reached result cap during recursive listing"
                            );
                            return Ok(files);
                        }
                    }
                }

                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
            debug!(folder_id = %folder_id, total_files = files.len(), "Folder listed");
        }

        info!(
            count = files.len(),
            folders_visited = visited.len(),
            "Recursive listing complete"
        );
        Ok(files)
    }

    /// Lists the files directly inside `folder_id`, without descending.
    pub fn list_nonrecursive(
        &self,
        folder_id: &str,
        max_results: usize,
    ) -> Result<Vec<FileMetadata>, DiscoveryError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        while files.len() < max_results {
            let page = self
                .store
                .list_children(folder_id, page_token.as_deref())
                .map_err(|source| DiscoveryError::Listing {
                    folder_id: folder_id.to_string(),
                    source,
                })?;

            files.extend(page.items.into_iter().filter(|item| !item.is_folder()));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        files.truncate(max_results);
        info!(folder_id, count = files.len(), "Listed folder");
        Ok(files)
    }

    /// Lists the sub-folders directly inside `folder_id`.
    pub fn list_subfolders(
        &self,
        folder_id: &str,
        max_results: usize,
    ) -> Result<Vec<FileMetadata>, DiscoveryError> {
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        while folders.len() < max_results {
            let page = self
                .store
                .list_children(folder_id, page_token.as_deref())
                .map_err(|source| DiscoveryError::Listing {
                    folder_id: folder_id.to_string(),
                    source,
                })?;

            folders.extend(page.items.into_iter().filter(FileMetadata::is_folder));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        folders.truncate(max_results);
        Ok(folders)
    }
}
