//! # Deferred Blob Reclaimer
//!
//! Removes purged media from the object store and from the local mirror.
//! Work is handed to the background pool only after the owning transaction
//! committed. Each of the four deletions per blob runs independently; a
//! failure is logged and never reaches the caller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use domains::{BlobRef, LocalFiles, ObjectStore};

use crate::background::BackgroundPool;

/// Where a stored filename lives remotely and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLayout {
    pub source_prefix: String,
    pub thumbnail_prefix: String,
    pub image_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
}

impl Default for MediaLayout {
    fn default() -> Self {
        Self {
            source_prefix: "src".into(),
            thumbnail_prefix: "thumb".into(),
            image_dir: PathBuf::from("/tmp/board/src/"),
            thumbnail_dir: PathBuf::from("/tmp/board/thumb/"),
        }
    }
}

impl MediaLayout {
    pub fn source_key(&self, file: &str) -> String {
        object_key(&self.source_prefix, file)
    }

    pub fn thumbnail_key(&self, file: &str) -> String {
        object_key(&self.thumbnail_prefix, file)
    }
}

fn object_key(prefix: &str, file: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file.to_string()
    } else {
        format!("{prefix}/{file}")
    }
}

/// A stored filename we are willing to delete by. Anything that could
/// resolve to a directory or escape it is refused.
fn deletable(file: &str) -> bool {
    !file.is_empty()
        && file != "."
        && file != ".."
        && !file.contains('/')
        && !file.contains('\\')
}

/// Outcome of one blob's deletions, or the running sum over dispatched jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimReport {
    pub attempted: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Tally {
    attempted: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn add(&self, report: ReclaimReport) {
        self.attempted.fetch_add(report.attempted, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReclaimReport {
        ReclaimReport {
            attempted: self.attempted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct BlobReclaimer {
    objects: Arc<dyn ObjectStore>,
    files: Arc<dyn LocalFiles>,
    layout: Arc<MediaLayout>,
    pool: BackgroundPool,
    tally: Arc<Tally>,
}

impl BlobReclaimer {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        files: Arc<dyn LocalFiles>,
        layout: MediaLayout,
        pool: BackgroundPool,
    ) -> Self {
        Self { objects, files, layout: Arc::new(layout), pool, tally: Arc::default() }
    }

    /// Detaches one job per blob. Returns how many were dispatched; each
    /// job's report is added to [`BlobReclaimer::totals`].
    pub fn dispatch(&self, blobs: Vec<BlobRef>) -> usize {
        let count = blobs.len();
        for blob in blobs {
            let reclaimer = self.clone();
            self.pool.spawn("reclaim_blob", async move {
                let report = reclaimer.reclaim(&blob).await;
                reclaimer.tally.add(report);
            });
        }
        count
    }

    /// Deletions attempted and failed by every job finished so far.
    pub fn totals(&self) -> ReclaimReport {
        self.tally.snapshot()
    }

    /// Runs the deletions for one blob. Skipped sides are not attempted.
    pub async fn reclaim(&self, blob: &BlobRef) -> ReclaimReport {
        let layout = &self.layout;
        let source = deletable(&blob.file).then(|| blob.file.as_str());
        let thumb = deletable(&blob.thumbnail).then(|| blob.thumbnail.as_str());

        if source.is_none() && !blob.file.is_empty() {
            error!(file = %blob.file, "refusing to reclaim unsafe source name");
        }
        if thumb.is_none() && !blob.thumbnail.is_empty() {
            error!(file = %blob.thumbnail, "refusing to reclaim unsafe thumbnail name");
        }

        let (remote_src, remote_thumb, local_src, local_thumb) = tokio::join!(
            self.remote(source.map(|f| layout.source_key(f))),
            self.remote(thumb.map(|f| layout.thumbnail_key(f))),
            self.local(source.map(|f| layout.image_dir.join(f))),
            self.local(thumb.map(|f| layout.thumbnail_dir.join(f))),
        );

        let mut report = ReclaimReport::default();
        for outcome in [remote_src, remote_thumb, local_src, local_thumb].into_iter().flatten() {
            report.attempted += 1;
            if !outcome {
                report.failed += 1;
            }
        }
        if report.attempted > 0 {
            info!(
                file = %blob.file,
                attempted = report.attempted,
                failed = report.failed,
                "media reclaimed"
            );
        }
        report
    }

    /// `None` when skipped, otherwise whether it succeeded.
    async fn remote(&self, key: Option<String>) -> Option<bool> {
        let key = key?;
        match self.objects.delete(&key).await {
            Ok(()) => Some(true),
            Err(e) => {
                error!(path = %key, error = %e, "object delete failed");
                Some(false)
            }
        }
    }

    async fn local(&self, path: Option<PathBuf>) -> Option<bool> {
        let path = path?;
        match self.files.remove_if_exists(&path).await {
            Ok(()) => Some(true),
            Err(e) => {
                error!(path = %path.display(), error = %e, "local file removal failed");
                Some(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{DomainError, MockLocalFiles, MockObjectStore};
    use std::path::Path;

    fn blob(file: &str, thumbnail: &str) -> BlobRef {
        BlobRef { file: file.into(), thumbnail: thumbnail.into() }
    }

    #[test]
    fn keys_join_prefix_and_name() {
        let layout = MediaLayout::default();
        assert_eq!(layout.source_key("a.png"), "src/a.png");
        assert_eq!(layout.thumbnail_key("a_t.png"), "thumb/a_t.png");

        let bare = MediaLayout { source_prefix: "/".into(), ..MediaLayout::default() };
        assert_eq!(bare.source_key("a.png"), "a.png");
    }

    #[test]
    fn unsafe_names_are_refused() {
        for name in ["", ".", "..", "../etc/passwd", "a/b.png", "a\\b.png"] {
            assert!(!deletable(name), "{name:?} should be refused");
        }
        assert!(deletable("1700000000123.png"));
    }

    #[tokio::test]
    async fn attempts_all_four_deletions_despite_failures() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_delete()
            .withf(|path| path == "src/a.png")
            .times(1)
            .returning(|_| Err(DomainError::internal("503")));
        objects
            .expect_delete()
            .withf(|path| path == "thumb/a_t.png")
            .times(1)
            .returning(|_| Ok(()));

        let mut files = MockLocalFiles::new();
        files
            .expect_remove_if_exists()
            .withf(|path: &Path| path == Path::new("/tmp/board/src/a.png"))
            .times(1)
            .returning(|_| Err(DomainError::internal("EACCES")));
        files
            .expect_remove_if_exists()
            .withf(|path: &Path| path == Path::new("/tmp/board/thumb/a_t.png"))
            .times(1)
            .returning(|_| Ok(()));

        let reclaimer = BlobReclaimer::new(
            Arc::new(objects),
            Arc::new(files),
            MediaLayout::default(),
            BackgroundPool::new(2),
        );
        let report = reclaimer.reclaim(&blob("a.png", "a_t.png")).await;
        assert_eq!(report, ReclaimReport { attempted: 4, failed: 2 });
    }

    #[tokio::test]
    async fn empty_thumbnail_skips_that_side_only() {
        let mut objects = MockObjectStore::new();
        objects.expect_delete().withf(|path| path == "src/a.png").times(1).returning(|_| Ok(()));

        let mut files = MockLocalFiles::new();
        files.expect_remove_if_exists().times(1).returning(|_| Ok(()));

        let reclaimer = BlobReclaimer::new(
            Arc::new(objects),
            Arc::new(files),
            MediaLayout::default(),
            BackgroundPool::new(2),
        );
        let report = reclaimer.reclaim(&blob("a.png", "")).await;
        assert_eq!(report.attempted, 2);
    }

    #[tokio::test]
    async fn dispatch_runs_on_the_pool() {
        let mut objects = MockObjectStore::new();
        objects.expect_delete().times(4).returning(|_| Ok(()));
        let mut files = MockLocalFiles::new();
        files.expect_remove_if_exists().times(4).returning(|_| Ok(()));

        let pool = BackgroundPool::new(1);
        let reclaimer =
            BlobReclaimer::new(Arc::new(objects), Arc::new(files), MediaLayout::default(), pool.clone());
        let dispatched = reclaimer.dispatch(vec![blob("a.png", "a_t.png"), blob("b.png", "b_t.png")]);
        assert_eq!(dispatched, 2);

        pool.wait_idle().await;
        assert_eq!(reclaimer.totals(), ReclaimReport { attempted: 8, failed: 0 });
    }

    #[tokio::test]
    async fn totals_count_failures_from_finished_jobs() {
        let mut objects = MockObjectStore::new();
        objects.expect_delete().times(2).returning(|_| Err(DomainError::internal("503")));
        let mut files = MockLocalFiles::new();
        files.expect_remove_if_exists().times(2).returning(|_| Ok(()));

        let pool = BackgroundPool::new(1);
        let reclaimer =
            BlobReclaimer::new(Arc::new(objects), Arc::new(files), MediaLayout::default(), pool.clone());
        assert_eq!(reclaimer.totals(), ReclaimReport::default());

        reclaimer.dispatch(vec![blob("a.png", "a_t.png")]);
        pool.wait_idle().await;

        assert_eq!(reclaimer.totals(), ReclaimReport { attempted: 4, failed: 2 });
    }
}
