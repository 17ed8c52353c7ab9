use atomicwrites::{AtomicFile, OverwriteBehavior};
use newsrag_core::{Article, ArticleRecord, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a [`ArticleStore::merge_insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MergeReport {
    pub new: usize,
    pub duplicates: usize,
    pub total: usize,
}

/// Whole-set JSON file of articles.
///
/// Every mutation rewrites the full file through a temp file and an atomic
/// rename, so readers always see either the previous or the next complete set.
/// Writers are serialized by a per-store lock; readers never block.
pub struct ArticleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ArticleStore {
    /// Open the store at `path`, creating an empty one if none exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| store_io_error("create store directory", &e))?;
        }

        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };

        if !store.path.exists() {
            store.write(&[])?;
            info!(path = ?store.path, "created empty article store");
        }

        Ok(store)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every persisted article, in stored order.
    pub fn read(&self) -> Result<Vec<Article>> {
        let data = std::fs::read(&self.path).map_err(|e| store_io_error("read article store", &e))?;
        let records: Vec<ArticleRecord> = serde_json::from_slice(&data)
            .map_err(|e| Error::store_unavailable(format!("article store is corrupt: {}", e), false))?;

        // A record without a url has no identity; it is dropped rather than
        // locking every later merge out of the store.
        let articles = records
            .into_iter()
            .filter_map(|record| match record.into_article() {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "skipping unreadable stored article");
                    None
                }
            })
            .collect();
        Ok(articles)
    }

    /// Fail-soft read: any failure is logged and reported as an empty store.
    pub fn read_or_empty(&self) -> Vec<Article> {
        self.read().unwrap_or_else(|e| {
            warn!(path = ?self.path, error = %e, "reading article store failed, treating as empty");
            Vec::new()
        })
    }

    /// Replace the persisted set with exactly `articles`.
    pub fn write(&self, articles: &[Article]) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.write_locked(articles)
    }

    fn write_locked(&self, articles: &[Article]) -> Result<usize> {
        let records: Vec<ArticleRecord> = articles.iter().map(ArticleRecord::from).collect();
        let data = serde_json::to_vec(&records)?;

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::store_unavailable(format!("write article store: {}", e), true))?;

        debug!(count = records.len(), path = ?self.path, "article store written");
        Ok(records.len())
    }

    /// Append the articles whose ids are not stored yet and persist the result.
    ///
    /// Duplicates inside `articles` itself are counted as duplicates too, so a
    /// given URL is stored at most once however often it is ingested.
    pub fn merge_insert(&self, articles: Vec<Article>) -> Result<MergeReport> {
        let _guard = self.write_lock.lock();

        let mut merged = self.read()?;
        let mut seen: HashSet<String> = merged.iter().map(|a| a.id().to_string()).collect();

        let mut report = MergeReport::default();
        for article in articles {
            if seen.insert(article.id().to_string()) {
                merged.push(article);
                report.new += 1;
            } else {
                report.duplicates += 1;
            }
        }

        report.total = self.write_locked(&merged)?;
        info!(new = report.new, duplicates = report.duplicates, total = report.total, "merged articles into store");
        Ok(report)
    }

    pub fn clear(&self) -> Result<()> {
        self.write(&[])?;
        info!(path = ?self.path, "article store cleared");
        Ok(())
    }

    /// Number of stored articles (reads the whole file)
    pub fn stats(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

fn store_io_error(action: &str, e: &io::Error) -> Error {
    let retryable = matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    );
    Error::store_unavailable(format!("{}: {}", action, e), retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str) -> Article {
        Article::new(format!("Title {}", url), "d", "c", url, "Source", "2024-01-01", None).unwrap()
    }

    #[test]
    fn test_open_creates_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("articles.json");
        let store = ArticleStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.read().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_open_keeps_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        ArticleStore::open(&path).unwrap().write(&[article("u1")]).unwrap();

        let reopened = ArticleStore::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap(), 1);
    }

    #[test]
    fn test_merge_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::open(dir.path().join("a.json")).unwrap();

        let first = store.merge_insert(vec![article("u1"), article("u2")]).unwrap();
        assert_eq!(first, MergeReport { new: 2, duplicates: 0, total: 2 });

        let second = store
            .merge_insert(vec![article("u1"), article("u2"), article("u3")])
            .unwrap();
        assert_eq!(second, MergeReport { new: 1, duplicates: 2, total: 3 });
    }

    #[test]
    fn test_merge_dedups_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::open(dir.path().join("a.json")).unwrap();
        let report = store.merge_insert(vec![article("u1"), article("u1")]).unwrap();
        assert_eq!(report, MergeReport { new: 1, duplicates: 1, total: 1 });
    }

    #[test]
    fn test_write_replaces_and_clear_empties() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::open(dir.path().join("a.json")).unwrap();
        store.write(&[article("u1"), article("u2")]).unwrap();
        assert_eq!(store.write(&[article("u3")]).unwrap(), 1);

        let urls: Vec<String> = store.read().unwrap().iter().map(|a| a.url().to_string()).collect();
        assert_eq!(urls, vec!["u3"]);

        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_file_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let store = ArticleStore::open(&path).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let err = store.read().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { retryable: false, .. }));
        assert!(store.read_or_empty().is_empty());
        assert!(store.merge_insert(vec![article("u1")]).is_err());
    }

    #[test]
    fn test_reads_records_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(
            &path,
            r#"[{"id":"abc123","title":"T","description":null,"content":null,"url":"u0",
                "source_name":null,"published_at":null,"author":null},
               {"id":"nourl","title":"Lost","url":null}]"#,
        )
        .unwrap();
        let store = ArticleStore::open(&path).unwrap();

        let stored = store.read().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title(), "T");
        assert_eq!(stored[0].description(), "");

        let report = store.merge_insert(vec![article("u0"), article("u1")]).unwrap();
        assert_eq!(report, MergeReport { new: 1, duplicates: 1, total: 2 });
    }
}
