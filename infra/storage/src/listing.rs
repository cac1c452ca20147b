use crate::engine::{FileStats, LocalStorage};
use crate::error::StorageError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub per_page: usize,
}

impl ListOptions {
    #[must_use]
    pub const fn per_page(per_page: usize) -> Self {
        Self { per_page }
    }
}

/// Pages through every regular file under the storage path, sorted by file name
/// within each directory.
///
/// The directory walk runs on the first [`FilesCursor::next_page`] call. Files
/// deleted after that are skipped rather than reported.
#[derive(Debug)]
pub struct FilesCursor {
    storage: LocalStorage,
    per_page: usize,
    pending: Option<VecDeque<PathBuf>>,
}

impl FilesCursor {
    /// The next page, or `None` once every file has been yielded.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] if the walk cannot read a directory or a file's
    /// metadata.
    pub async fn next_page(&mut self) -> Result<Option<Vec<FileStats>>, StorageError> {
        if self.pending.is_none() {
            let root = self.storage.path().to_path_buf();
            let files = tokio::task::spawn_blocking(move || walk_files(&root))
                .await
                .map_err(|e| StorageError::Internal {
                    message: e.to_string().into(),
                    context: Some("Listing task failed".into()),
                })??;
            debug!(count = files.len(), "Listed storage files");
            self.pending = Some(files);
        }

        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };

        let mut page = Vec::with_capacity(self.per_page.min(pending.len()));
        while page.len() < self.per_page {
            let Some(path) = pending.pop_front() else { break };
            match self.storage.stats_of(path).await {
                Ok(stats) => page.push(stats),
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e),
            }
        }

        Ok((!page.is_empty()).then_some(page))
    }

    /// Drains the remaining pages into one list.
    ///
    /// # Errors
    /// See [`FilesCursor::next_page`].
    pub async fn collect_all(mut self) -> Result<Vec<FileStats>, StorageError> {
        let mut files = Vec::new();
        while let Some(page) = self.next_page().await? {
            files.extend(page);
        }
        Ok(files)
    }
}

fn walk_files(root: &Path) -> Result<VecDeque<PathBuf>, StorageError> {
    let mut files = VecDeque::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("Walking {}", e.path().unwrap_or(root).display());
            match e.into_io_error() {
                Some(source) => StorageError::Io { source, context: Some(context.into()) },
                None => StorageError::Internal {
                    message: "filesystem loop detected".into(),
                    context: Some(context.into()),
                },
            }
        })?;
        if entry.file_type().is_file() {
            files.push_back(entry.into_path());
        }
    }
    Ok(files)
}

impl LocalStorage {
    /// Starts a paginated listing.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidInput`] when `per_page` is zero.
    pub fn files_cursor(&self, options: ListOptions) -> Result<FilesCursor, StorageError> {
        if options.per_page == 0 {
            return Err(StorageError::InvalidInput {
                message: "per_page must be at least 1".into(),
                context: Some("Listing files".into()),
            });
        }
        Ok(FilesCursor { storage: self.clone(), per_page: options.per_page, pending: None })
    }

    /// A listing using the configured page size.
    #[must_use]
    pub fn files(&self) -> FilesCursor {
        FilesCursor { storage: self.clone(), per_page: self.per_page, pending: None }
    }
}
