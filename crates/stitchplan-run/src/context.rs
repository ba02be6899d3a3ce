//! Run contexts and the factory that lays them out on disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::artifact::{ArtifactStore, FsArtifactStore};
use crate::clock::{Clock, SystemClock};
use crate::error::RunError;
use crate::events::JsonLogger;
use crate::layout::{self, EVENTS_FILE};
use crate::manifest::ManifestWriter;

type Closer = Box<dyn FnOnce() -> Result<(), RunError> + Send>;

/// Everything a step needs to log, persist and seed randomness for one run.
///
/// [`RunContext::close`] emits `run_end` and flushes the manifest exactly
/// once; dropping an unclosed context closes it.
pub struct RunContext {
    run_id: String,
    run_dir: PathBuf,
    logger: Arc<JsonLogger>,
    artifact_store: Arc<dyn ArtifactStore>,
    rng_seed: u64,
    closer: Mutex<Option<Closer>>,
}

impl RunContext {
    /// Assemble a context. `on_close` runs on the first [`close`](Self::close).
    pub fn new(
        run_id: impl Into<String>,
        run_dir: impl Into<PathBuf>,
        logger: Arc<JsonLogger>,
        artifact_store: Arc<dyn ArtifactStore>,
        rng_seed: u64,
        on_close: impl FnOnce() -> Result<(), RunError> + Send + 'static,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            run_dir: run_dir.into(),
            logger,
            artifact_store,
            rng_seed,
            closer: Mutex::new(Some(Box::new(on_close))),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    #[must_use]
    pub fn logger(&self) -> &JsonLogger {
        &self.logger
    }

    #[must_use]
    pub fn artifact_store(&self) -> &dyn ArtifactStore {
        self.artifact_store.as_ref()
    }

    /// Seed for any randomized step, fixed for a given run id.
    #[must_use]
    pub const fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    /// Finish the run. Later and concurrent calls return `Ok(())` once the
    /// first call has completed.
    ///
    /// # Errors
    ///
    /// Returns the close callback's error on the first call only.
    pub fn close(&self) -> Result<(), RunError> {
        let mut closer = self.closer.lock().unwrap_or_else(PoisonError::into_inner);
        closer.take().map_or(Ok(()), |close| close())
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("run_dir", &self.run_dir)
            .field("rng_seed", &self.rng_seed)
            .finish_non_exhaustive()
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(run_id = %self.run_id, %err, "failed to close run on drop");
        }
    }
}

/// Source of run ids.
pub trait RunIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

impl<F> RunIdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn next_id(&self) -> String {
        self()
    }
}

/// Random v4 UUIDs without dashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRunIds;

impl RunIdGenerator for UuidRunIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Seed derived from the first eight bytes of `SHA-256(run_id)`.
#[must_use]
pub fn seed_for_run(run_id: &str) -> u64 {
    let digest = Sha256::digest(run_id.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Creates run directories and their [`RunContext`]s under one storage root.
pub struct RunContextFactory {
    storage_root: PathBuf,
    ids: Arc<dyn RunIdGenerator>,
    clock: Arc<dyn Clock>,
}

impl RunContextFactory {
    /// Factory with random run ids and the system clock.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ids: Arc::new(UuidRunIds),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: impl RunIdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Lay out a new run for `project_id` and emit `run_start`.
    ///
    /// Safe to call concurrently for the same project.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidArgument`] for a blank or multi-segment
    /// project id or run id, or a run id already in use;
    /// [`RunError::NotADirectory`] if a file occupies part of the layout;
    /// [`RunError::Io`] for other filesystem failures.
    #[tracing::instrument(skip(self), fields(root = %self.storage_root.display()))]
    pub fn create(&self, project_id: &str) -> Result<RunContext, RunError> {
        layout::validate_segment("project id", project_id)?;
        let run_id = self.ids.next_id();
        layout::validate_segment("run id", &run_id)?;

        let started = self.clock.now();
        let run_dir = layout::run_dir(&self.storage_root, project_id, started.date_naive(), &run_id);
        layout::create_run_dir(&run_dir)?;

        let manifest = Arc::new(ManifestWriter::new(
            run_id.clone(),
            run_dir.clone(),
            Arc::clone(&self.clock),
        ));
        let logger = Arc::new(JsonLogger::new(
            run_id.clone(),
            run_dir.join(EVENTS_FILE),
            Arc::clone(&self.clock),
            Arc::clone(&manifest),
        ));
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(
            run_id.clone(),
            &run_dir,
            Arc::clone(&self.clock),
        ));
        logger.run_start()?;

        let closing_logger = Arc::clone(&logger);
        let on_close = move || {
            closing_logger.run_end()?;
            manifest.write()?;
            Ok(())
        };
        tracing::debug!(%run_id, run_dir = %run_dir.display(), "run created");
        let seed = seed_for_run(&run_id);
        Ok(RunContext::new(run_id, run_dir, logger, store, seed, on_close))
    }
}
