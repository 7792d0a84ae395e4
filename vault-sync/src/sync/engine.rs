//! SyncEngine: keeps the site content directory in step with the vault
//!
//! Startup runs a full pass (index, reconcile, write every note, copy referenced
//! images). Afterwards watcher events update one note or one image at a time.
//! Stale outputs are only cleaned up by the startup reconciliation.

use super::images::{self, ImageMatch};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::notes::{file_ops, transform, Note, NoteIndex, NoteLoader, TransformOptions};
use crate::watch::{ChangeEvent, EventCoalescer, Target};
use futures_util::future::join_all;
use parking_lot::{RwLock, RwLockReadGuard};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SyncState {
    Bootstrapping,
    SteadyState,
}

/// Outcome of the startup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub notes_indexed: usize,
    pub notes_written: usize,
    pub write_failures: usize,
    pub outputs_removed: usize,
    pub images_copied: usize,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        format!(
            "{} notes indexed, {} written ({} failed), {} stale outputs removed, {} images copied",
            self.notes_indexed,
            self.notes_written,
            self.write_failures,
            self.outputs_removed,
            self.images_copied
        )
    }
}

pub struct SyncEngine {
    loader: NoteLoader,
    index: Arc<RwLock<NoteIndex>>,
    options: TransformOptions,
    image_match: ImageMatch,
    vault_images_path: PathBuf,
    astro_notes_path: PathBuf,
    astro_images_path: PathBuf,
    state: RwLock<SyncState>,
}

impl SyncEngine {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            loader: NoteLoader::new(&config.vault_notes_path),
            index: Arc::new(RwLock::new(NoteIndex::new())),
            options: config.transform_options(),
            image_match: config.image_match,
            vault_images_path: config.vault_images_path.clone(),
            astro_notes_path: config.astro_notes_path.clone(),
            astro_images_path: config.astro_images_path.clone(),
            state: RwLock::new(SyncState::Bootstrapping),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Read access to the current note index
    pub fn index(&self) -> RwLockReadGuard<'_, NoteIndex> {
        self.index.read()
    }

    /// Full startup pass. Must complete before watcher events are handled.
    pub async fn initial_sync(&self) -> Result<SyncReport> {
        let fresh = NoteIndex::load_all(&self.loader).await?;
        if fresh.is_empty() {
            log::warn!(
                "[SYNC] No publishable notes in {}; stale outputs will be removed",
                self.loader.notes_dir().display()
            );
        }
        for (slug, files) in fresh.duplicate_slugs() {
            log::warn!(
                "[SYNC] Slug '{}' is used by {}; only {} will be written",
                slug,
                files.join(", "),
                files[0]
            );
        }

        let mut report = SyncReport {
            notes_indexed: fresh.len(),
            ..Default::default()
        };
        *self.index.write() = fresh;

        report.outputs_removed = self.reconcile().await?.len();

        let (written, failed) = self.write_all().await;
        report.notes_written = written;
        report.write_failures = failed;

        report.images_copied = match self.sync_images().await {
            Ok(count) => count,
            Err(e) => {
                log::error!("[SYNC] Failed to sync images: {}", e);
                0
            }
        };

        *self.state.write() = SyncState::SteadyState;
        log::info!("[SYNC] Initial sync complete: {}", report.summary());
        Ok(report)
    }

    /// Delete every output note whose slug no longer belongs to an indexed note.
    /// Returns the removed file names.
    pub async fn reconcile(&self) -> Result<Vec<String>> {
        let existing = match file_ops::list_notes(&self.astro_notes_path).await {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(&self.astro_notes_path, e)),
        };

        let valid = self.index.read().slugs();

        let mut removed = Vec::new();
        for file in existing {
            if valid.contains(file_ops::title_from_file_id(&file)) {
                continue;
            }
            log::info!("[SYNC] Removing stale {}...", file);
            let path = self.astro_notes_path.join(&file);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed.push(file),
                Err(e) => log::warn!("[SYNC] Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Transform and write every note that owns its slug.
    /// Returns (written, failed).
    async fn write_all(&self) -> (usize, usize) {
        let outputs: Vec<(String, PathBuf, String)> = {
            let index = self.index.read();
            index
                .all()
                .filter_map(|note| {
                    self.render_output(&index, note)
                        .map(|(path, content)| (note.file_id.clone(), path, content))
                })
                .collect()
        };

        let results = join_all(outputs.iter().map(|(file_id, path, content)| async move {
            log::info!("[SYNC] Writing {}...", file_id);
            file_ops::write_note(path, content).await
        }))
        .await;

        let mut written = 0;
        let mut failed = 0;
        for ((file_id, path, _), result) in outputs.iter().zip(results) {
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    failed += 1;
                    log::error!("[SYNC] Failed to write {} to {}: {}", file_id, path.display(), e);
                }
            }
        }
        (written, failed)
    }

    /// Output path and content for a note, or None if it must not be written
    fn render_output(&self, index: &NoteIndex, note: &Note) -> Option<(PathBuf, String)> {
        let slug = note.slug();
        if !is_safe_slug(slug) {
            log::warn!("[SYNC] Skipping {}: slug '{}' is not a plain file name", note.file_id, slug);
            return None;
        }
        if !index.owns_slug(note) {
            let owner = index.slug_owner(slug).map(|n| n.file_id.as_str()).unwrap_or_default();
            log::warn!("[SYNC] Skipping {}: slug '{}' is owned by {}", note.file_id, slug, owner);
            return None;
        }

        let out = transform(note, index, &self.options);
        Some((self.astro_notes_path.join(out.output_file_name()), out.render()))
    }

    /// Re-load one note and rewrite its output.
    ///
    /// Returns Ok(false) when the note is not publishable (its existing output is
    /// left in place) or cannot be written because another note owns its slug.
    pub async fn on_note_changed(&self, file_id: &str) -> Result<bool> {
        let Some(note) = self.loader.load(file_id).await? else {
            log::debug!("[SYNC] {} is not publishable, leaving outputs untouched", file_id);
            return Ok(false);
        };

        self.index.write().upsert(note);

        let output = {
            let index = self.index.read();
            index
                .get(file_id)
                .and_then(|note| self.render_output(&index, note))
        };

        let Some((path, content)) = output else {
            return Ok(false);
        };

        log::info!("[SYNC] Writing {}...", file_id);
        file_ops::write_note(&path, &content)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        Ok(true)
    }

    /// Copy one image if any indexed note references it. Returns whether it was copied.
    pub async fn on_image_added(&self, image_name: &str) -> Result<bool> {
        let referenced = {
            let index = self.index.read();
            images::is_referenced(image_name, index.all(), self.image_match)
        };
        if !referenced {
            log::debug!("[SYNC] {} is not referenced by any note, skipping", image_name);
            return Ok(false);
        }

        let from = self.vault_images_path.join(image_name);
        let metadata = tokio::fs::metadata(&from)
            .await
            .map_err(|e| SyncError::io(&from, e))?;
        if !metadata.is_file() {
            log::debug!("[SYNC] {} is not a regular file, skipping", image_name);
            return Ok(false);
        }

        log::info!("[SYNC] Copying {}...", image_name);
        let to = self.astro_images_path.join(image_name);
        file_ops::copy_file(&from, &to)
            .await
            .map_err(|e| SyncError::io(&from, e))?;
        Ok(true)
    }

    /// Copy every referenced vault image. Returns the number copied.
    pub async fn sync_images(&self) -> Result<usize> {
        let images = file_ops::list_files(&self.vault_images_path)
            .await
            .map_err(|e| SyncError::io(&self.vault_images_path, e))?;

        let results = join_all(images.iter().map(|name| self.on_image_added(name))).await;

        let mut copied = 0;
        for (name, result) in images.iter().zip(results) {
            match result {
                Ok(true) => copied += 1,
                Ok(false) => {}
                Err(e) => log::error!("[SYNC] Failed to copy {}: {}", name, e),
            }
        }
        Ok(copied)
    }

    /// Apply one watcher event. Failures are logged, never propagated.
    pub async fn handle_event(&self, event: &ChangeEvent) {
        let Some(name) = event.file_name() else {
            return;
        };

        let result = match event.target {
            Target::Note => self.on_note_changed(&name).await.map(|_| ()),
            Target::Image => self.on_image_added(&name).await.map(|_| ()),
        };

        if let Err(e) = result {
            log::error!("[SYNC] Failed to apply {} event for {}: {}", event.kind, name, e);
        }
    }

    /// Consume watcher events until the channel closes or `shutdown` is cancelled.
    ///
    /// Events are debounced per path and then handled one at a time, so updates
    /// to the same note are applied in order.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<ChangeEvent>,
        coalescer: EventCoalescer,
        shutdown: CancellationToken,
    ) {
        let period = Duration::from_millis((coalescer.config().debounce_ms / 2).max(10));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("[SYNC] Shutdown requested, stopping event loop");
                    break;
                }
                received = events.recv() => match received {
                    Some(event) => {
                        if let Some(ready) = coalescer.add_event(event) {
                            self.handle_event(&ready).await;
                        }
                    }
                    None => {
                        log::info!("[SYNC] Event channel closed, stopping event loop");
                        break;
                    }
                },
                _ = tick.tick() => {
                    for ready in coalescer.check_timeouts() {
                        self.handle_event(&ready).await;
                    }
                }
            }
        }

        if coalescer.pending_count() > 0 {
            log::info!("[SYNC] Flushing {} pending events", coalescer.pending_count());
        }
        for ready in coalescer.flush_all() {
            self.handle_event(&ready).await;
        }
    }
}

/// Slugs become file names in the output directory, so path separators and
/// relative components are rejected
fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty() && slug != "." && slug != ".." && !slug.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::{ChangeKind, CoalescerConfig};
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        config: SyncConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let vault = dir.path().join("vault");
            fs::create_dir_all(vault.join("notes")).unwrap();
            fs::create_dir_all(vault.join("images")).unwrap();

            let config = SyncConfig {
                vault_notes_path: vault.join("notes"),
                vault_images_path: vault.join("images"),
                vault_path: vault,
                // Output directories are created on first write
                astro_notes_path: dir.path().join("site/notes"),
                astro_images_path: dir.path().join("site/images"),
                replace_file_system_image_src: false,
                link_base: "/".to_string(),
                image_match: ImageMatch::Substring,
                field_renames: Vec::new(),
                debounce_ms: 0,
            };

            Self { _dir: dir, config }
        }

        fn note(&self, file_id: &str, content: &str) {
            fs::write(self.config.vault_notes_path.join(file_id), content).unwrap();
        }

        fn image(&self, name: &str) {
            fs::write(self.config.vault_images_path.join(name), b"\x89PNG").unwrap();
        }

        fn output(&self, file: &str) -> PathBuf {
            self.config.astro_notes_path.join(file)
        }

        fn read_output(&self, file: &str) -> String {
            fs::read_to_string(self.output(file)).unwrap()
        }

        fn copied_image(&self, name: &str) -> PathBuf {
            self.config.astro_images_path.join(name)
        }

        fn engine(&self) -> SyncEngine {
            SyncEngine::new(&self.config)
        }
    }

    fn published(slug: &str, body: &str) -> String {
        format!("---\nslug: {}\npublish: true\n---\n{}", slug, body)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "stale").unwrap();
    }

    #[tokio::test]
    async fn test_initial_sync_resolves_links() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "see [[B]]"));
        fx.note("B.md", &published("b", "I am B"));

        let engine = fx.engine();
        assert_eq!(engine.state(), SyncState::Bootstrapping);
        let report = engine.initial_sync().await.unwrap();
        assert_eq!(engine.state(), SyncState::SteadyState);

        assert_eq!(report.notes_indexed, 2);
        assert_eq!(report.notes_written, 2);
        assert_eq!(fx.read_output("a.md"), "---\nslug: a\npublish: true\n---\nsee [B](/b/)");
        assert!(fx.output("b.md").exists());
    }

    #[tokio::test]
    async fn test_initial_sync_missing_link_is_plain_text() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "see [[Missing]]"));

        fx.engine().initial_sync().await.unwrap();
        let out = fx.read_output("a.md");
        assert!(out.ends_with("see Missing"));
        assert!(!out.contains("](/"));
        assert!(!out.contains("[["));
    }

    #[tokio::test]
    async fn test_initial_sync_skips_unpublished() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "[[Draft]]"));
        fx.note("Draft.md", "---\nslug: draft\npublish: false\n---\nsecret");
        fx.note("Plain.md", "no frontmatter");

        let report = fx.engine().initial_sync().await.unwrap();
        assert_eq!(report.notes_written, 1);
        assert!(!fx.output("draft.md").exists());
        // Links to unpublished notes degrade to text
        assert!(fx.read_output("a.md").ends_with("\nDraft"));
    }

    #[tokio::test]
    async fn test_reconcile_removes_only_stale_outputs() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", ""));
        touch(&fx.output("old.md"));
        touch(&fx.output("a.md"));
        touch(&fx.output("keep.txt"));
        touch(&fx.output(".hidden.md"));

        let report = fx.engine().initial_sync().await.unwrap();
        assert_eq!(report.outputs_removed, 1);
        assert!(!fx.output("old.md").exists());
        assert!(fx.output("a.md").exists());
        assert!(fx.output("keep.txt").exists());
        assert!(fx.output(".hidden.md").exists());
    }

    #[tokio::test]
    async fn test_reconcile_without_output_dir() {
        let fx = Fixture::new();
        let engine = fx.engine();
        assert!(engine.reconcile().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_images_copied_only_when_referenced() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "![diagram](/images/diagram.png)"));
        fx.image("diagram.png");
        fx.image("unused.png");
        fx.image(".DS_Store");

        let report = fx.engine().initial_sync().await.unwrap();
        assert_eq!(report.images_copied, 1);
        assert!(fx.copied_image("diagram.png").exists());
        assert!(!fx.copied_image("unused.png").exists());
        assert!(!fx.copied_image(".DS_Store").exists());
    }

    #[tokio::test]
    async fn test_token_image_match() {
        let mut fx = Fixture::new();
        fx.config.image_match = ImageMatch::Token;
        fx.note("A.md", &published("a", "![](/images/bobcat.png)"));
        fx.image("cat.png");
        fx.image("bobcat.png");

        let engine = fx.engine();
        engine.initial_sync().await.unwrap();
        assert!(fx.copied_image("bobcat.png").exists());
        assert!(!fx.copied_image("cat.png").exists());
    }

    #[tokio::test]
    async fn test_on_note_changed_rewrites_output() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "v1"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();

        fx.note("A.md", &published("a", "v2 [[C]]"));
        fx.note("C.md", &published("c", "new"));
        assert!(engine.on_note_changed("C.md").await.unwrap());
        assert!(engine.on_note_changed("A.md").await.unwrap());

        assert!(fx.read_output("a.md").ends_with("v2 [C](/c/)"));
        assert!(fx.output("c.md").exists());
        assert_eq!(engine.index().len(), 2);
    }

    #[tokio::test]
    async fn test_on_note_changed_unpublished_keeps_output() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "v1"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();

        fx.note("A.md", "---\nslug: a\npublish: false\n---\nv2");
        assert!(!engine.on_note_changed("A.md").await.unwrap());
        assert!(fx.read_output("a.md").ends_with("v1"));
    }

    #[tokio::test]
    async fn test_on_note_changed_missing_file_is_error() {
        let fx = Fixture::new();
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();
        assert!(engine.on_note_changed("Gone.md").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_slug_written_once() {
        let fx = Fixture::new();
        fx.note("First.md", &published("same", "first"));
        fx.note("Second.md", &published("same", "second"));

        let engine = fx.engine();
        let report = engine.initial_sync().await.unwrap();
        assert_eq!(report.notes_written, 1);
        assert!(fx.read_output("same.md").ends_with("first"));

        // The non-owner's updates never overwrite the owner's output
        fx.note("Second.md", &published("same", "second v2"));
        assert!(!engine.on_note_changed("Second.md").await.unwrap());
        assert!(fx.read_output("same.md").ends_with("first"));
    }

    #[tokio::test]
    async fn test_unsafe_slug_not_written() {
        let fx = Fixture::new();
        fx.note("Evil.md", &published("../escape", "x"));

        let report = fx.engine().initial_sync().await.unwrap();
        assert_eq!(report.notes_indexed, 1);
        assert_eq!(report.notes_written, 0);
        assert!(!fx.config.astro_notes_path.parent().unwrap().join("escape.md").exists());
    }

    #[tokio::test]
    async fn test_on_image_added() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "![[photo.jpg]]"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();

        fx.image("photo.jpg");
        fx.image("other.jpg");
        assert!(engine.on_image_added("photo.jpg").await.unwrap());
        assert!(!engine.on_image_added("other.jpg").await.unwrap());
        assert!(fx.copied_image("photo.jpg").exists());
        assert!(!fx.copied_image("other.jpg").exists());
    }

    #[tokio::test]
    async fn test_referenced_directory_is_not_copied() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "see the gallery folder"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();

        fs::create_dir(fx.config.vault_images_path.join("gallery")).unwrap();
        assert!(!engine.on_image_added("gallery").await.unwrap());
        assert!(!fx.copied_image("gallery").exists());
    }

    #[tokio::test]
    async fn test_file_url_stripping_and_renames() {
        let mut fx = Fixture::new();
        fx.config.replace_file_system_image_src = true;
        fx.config.field_renames = vec![("tags".to_string(), "categories".to_string())];
        let vault = fx.config.vault_path.to_string_lossy().to_string();
        fx.note(
            "A.md",
            &format!(
                "---\nslug: a\npublish: true\ntags: [x]\n---\n![](file://{}/images/p.png)",
                vault
            ),
        );

        fx.engine().initial_sync().await.unwrap();
        assert_eq!(
            fx.read_output("a.md"),
            "---\nslug: a\npublish: true\ncategories: [x]\n---\n![](/images/p.png)"
        );
    }

    #[tokio::test]
    async fn test_run_handles_events_until_channel_closes() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "v1"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();

        fx.note("A.md", &published("a", "v2 ![](x.png)"));
        fx.image("x.png");

        let (tx, rx) = mpsc::unbounded_channel();
        let notes_dir = fx.config.vault_notes_path.clone();
        let images_dir = fx.config.vault_images_path.clone();
        tx.send(ChangeEvent::new(ChangeKind::Changed, Target::Note, notes_dir.join("A.md"))).unwrap();
        tx.send(ChangeEvent::new(ChangeKind::Added, Target::Image, images_dir.join("x.png"))).unwrap();
        // A failing event is logged and does not stop the loop
        tx.send(ChangeEvent::new(ChangeKind::Changed, Target::Note, notes_dir.join("Gone.md"))).unwrap();
        drop(tx);

        let coalescer = EventCoalescer::new(CoalescerConfig {
            enabled: false,
            ..Default::default()
        });
        engine.run(rx, coalescer, CancellationToken::new()).await;

        assert!(fx.read_output("a.md").ends_with("v2 ![](x.png)"));
        assert!(fx.copied_image("x.png").exists());
    }

    #[tokio::test]
    async fn test_run_flushes_debounced_events_on_shutdown() {
        let fx = Fixture::new();
        fx.note("A.md", &published("a", "v1"));
        let engine = fx.engine();
        engine.initial_sync().await.unwrap();
        fx.note("A.md", &published("a", "v2"));

        let (tx, rx) = mpsc::unbounded_channel();
        let path = fx.config.vault_notes_path.join("A.md");
        for _ in 0..3 {
            tx.send(ChangeEvent::new(ChangeKind::Changed, Target::Note, &path)).unwrap();
        }

        let shutdown = CancellationToken::new();
        let coalescer = EventCoalescer::new(CoalescerConfig {
            debounce_ms: 60_000,
            max_wait_ms: 60_000,
            enabled: true,
        });
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });
        engine.run(rx, coalescer, shutdown).await;
        drop(tx);

        assert!(fx.read_output("a.md").ends_with("v2"));
    }

    #[test]
    fn test_is_safe_slug() {
        assert!(is_safe_slug("my-note"));
        assert!(is_safe_slug("v1.2"));
        assert!(!is_safe_slug(""));
        assert!(!is_safe_slug(".."));
        assert!(!is_safe_slug("a/b"));
        assert!(!is_safe_slug("a\\b"));
    }
}
