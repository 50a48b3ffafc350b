use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn, Span};

use crate::dicom::{find_dicom_files, is_dicom_file, Converter};
use crate::discovery::RecursiveLister;
use crate::error::{DicomflowError, StagingError, StoreError};
use crate::remote::RemoteStore;
use crate::resilience::{CircuitBreaker, CircuitState};
use crate::storage::StagingArea;
use crate::worker::{ProcessingResult, ProcessingStatus, Task, WorkerPool};

use super::config::PipelineConfig;
use super::context::{Stage, StageItem, StageOutcome};
use super::stats::RunStats;

/// Runs a batch of tasks through download, validate, convert, upload and
/// cleanup. Each stage finishes for every item before the next begins.
pub struct BatchPipeline<S: RemoteStore, C: Converter> {
    store: S,
    converter: C,
    config: PipelineConfig,
    output_folder_id: String,
    breaker: CircuitBreaker,
    staging: StagingArea,
    download_pool: WorkerPool,
    convert_pool: WorkerPool,
    upload_pool: WorkerPool,
    stats: RunStats,
}

impl<S: RemoteStore, C: Converter> BatchPipeline<S, C> {
    /// `output_folder_id` is the already-resolved upload destination.
    pub fn new(
        store: S,
        converter: C,
        config: PipelineConfig,
        output_folder_id: impl Into<String>,
    ) -> Self {
        let breaker = config.build_circuit_breaker();
        let staging = StagingArea::new(&config.staging_directory);
        let download_pool = WorkerPool::new("download", config.download_workers.max(1));
        let convert_pool = WorkerPool::new("convert", config.convert_workers.max(1));
        let upload_pool = WorkerPool::new("upload", config.upload_workers.max(1));

        Self {
            store,
            converter,
            config,
            output_folder_id: output_folder_id.into(),
            breaker,
            staging,
            download_pool,
            convert_pool,
            upload_pool,
            stats: RunStats::default(),
        }
    }

    /// Counters of the most recent batch.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Processes `tasks` and returns the results of the completed ones.
    ///
    /// Failed and skipped tasks are reported through [`Self::stats`] and
    /// the log only.
    pub fn process_batch(&mut self, tasks: Vec<Task>) -> Vec<ProcessingResult> {
        let run_id = uuid::Uuid::new_v4();
        let batch_span = info_span!("batch", run_id = %run_id, tasks = tasks.len());
        let _batch = batch_span.enter();

        self.stats = RunStats::start(tasks.len());
        info!("Starting batch of {} tasks", tasks.len());

        let (tasks, duplicates) = split_duplicates(tasks);
        self.stats.absorb(duplicates);

        if let Err(e) = self.staging.ensure() {
            error!(error = %e, "Cannot prepare staging area");
            let finished = tasks
                .iter()
                .map(|t| ProcessingResult::failed(t, None, e.to_string(), 0.0))
                .collect();
            self.stats.absorb(finished);
            self.finish_batch();
            return Vec::new();
        }

        let items: Vec<StageItem> = tasks.into_iter().map(StageItem::new).collect();

        info!("[1/5] Downloading {} items", items.len());
        let downloaded = self.run_pooled(Stage::Download, items);
        let downloaded = self.settle(Stage::Download, downloaded);

        info!("[2/5] Validating {} items", downloaded.len());
        let validated = self.run_sequential(Stage::Validate, downloaded);
        let validated = self.settle(Stage::Validate, validated);

        info!("[3/5] Converting {} items", validated.len());
        let converted = self.run_pooled(Stage::Convert, validated);
        let converted = self.settle(Stage::Convert, converted);

        info!("[4/5] Uploading {} items", converted.len());
        let uploaded = self.run_pooled(Stage::Upload, converted);
        let completed = self.collect_completed(uploaded);

        info!("[5/5] Cleaning up staging area");
        self.cleanup();

        self.finish_batch();
        completed
    }

    fn finish_batch(&mut self) {
        self.stats.finish();
        info!(
            total = self.stats.total,
            completed = self.stats.completed,
            failed = self.stats.failed,
            skipped = self.stats.skipped,
            elapsed_secs = self.stats.elapsed().as_secs_f64(),
            "Batch finished\n{}",
            self.stats.summary()
        );
    }

    /// Records finished items and returns the ones moving on.
    fn settle(&mut self, stage: Stage, outcomes: Vec<StageOutcome>) -> Vec<StageItem> {
        let mut advancing = Vec::with_capacity(outcomes.len());
        let mut finished = Vec::new();
        for outcome in outcomes {
            match outcome {
                StageOutcome::Advance(item) => advancing.push(item),
                StageOutcome::Finished(result) => finished.push(result),
            }
        }
        debug!(
            stage = %stage,
            advancing = advancing.len(),
            finished = finished.len(),
            "Stage drained"
        );
        self.stats.absorb(finished);
        advancing
    }

    fn collect_completed(&mut self, outcomes: Vec<StageOutcome>) -> Vec<ProcessingResult> {
        let mut completed = Vec::new();
        let mut finished = Vec::new();
        for outcome in outcomes {
            match outcome {
                StageOutcome::Finished(result) if result.status == ProcessingStatus::Completed => {
                    completed.push(result.clone());
                    finished.push(result);
                }
                StageOutcome::Finished(result) => finished.push(result),
                StageOutcome::Advance(item) => {
                    finished.push(ProcessingResult::failed(
                        &item.task,
                        item.input_path.clone(),
                        "upload produced no result".to_string(),
                        item.elapsed_seconds(),
                    ));
                }
            }
        }
        self.stats.absorb(finished);
        completed
    }

    fn run_sequential(&self, stage: Stage, items: Vec<StageItem>) -> Vec<StageOutcome> {
        let _stage = info_span!("stage", stage = %stage).entered();
        items
            .into_iter()
            .map(|item| self.run_item(stage, item))
            .collect()
    }

    fn run_pooled(&self, stage: Stage, items: Vec<StageItem>) -> Vec<StageOutcome> {
        let _stage = info_span!("stage", stage = %stage).entered();
        let pool = match stage {
            Stage::Download => &self.download_pool,
            Stage::Convert => &self.convert_pool,
            _ => &self.upload_pool,
        };

        let pending: Vec<(Task, Instant, Option<PathBuf>)> = items
            .iter()
            .map(|i| (i.task.clone(), i.started, i.input_path.clone()))
            .collect();

        let parent = Span::current();
        let (mut outcomes, lost_reason) = match pool.run(items, |item| {
            let _entered = parent.enter();
            self.run_item(stage, item)
        }) {
            Ok(outcomes) => (outcomes, "worker stopped before returning a result".to_string()),
            Err(e) => {
                error!(stage = %stage, error = %e, "Worker pool failed");
                (Vec::new(), e.to_string())
            }
        };

        // Items a panicking worker held never come back; fail them here.
        let returned: HashSet<&str> = outcomes.iter().map(StageOutcome::file_id).collect();
        let lost: Vec<StageOutcome> = pending
            .into_iter()
            .filter(|(task, _, _)| !returned.contains(task.file_id.as_str()))
            .map(|(task, started, input)| {
                StageOutcome::Finished(ProcessingResult::failed(
                    &task,
                    input,
                    format!("{} failed: {}", stage, lost_reason),
                    started.elapsed().as_secs_f64(),
                ))
            })
            .collect();
        outcomes.extend(lost);
        outcomes
    }

    fn run_item(&self, stage: Stage, mut item: StageItem) -> StageOutcome {
        let _span = info_span!(
            "item",
            task_id = %item.task.file_id,
            patient = %item.task.patient_id
        )
        .entered();
        item.status = stage.status();
        debug!(status = %item.status, "Item entering stage");

        match stage {
            Stage::Download => self.download(item),
            Stage::Validate => self.validate(item),
            Stage::Convert => self.convert(item),
            Stage::Upload => self.upload(item),
            Stage::Cleanup => StageOutcome::Advance(item),
        }
    }

    fn download(&self, mut item: StageItem) -> StageOutcome {
        let key = item.task.staging_key();
        let result = self
            .staging
            .prepare_task_dir(&key)
            .map_err(DicomflowError::from)
            .and_then(|dir| match &item.task.study {
                Some(_) => self.download_study(&item.task, &dir),
                None => self.download_file(&item.task, &dir),
            });

        match result {
            Ok(path) => {
                info!(file = %item.task.file_name, "Downloaded");
                item.input_path = Some(path);
                StageOutcome::Advance(item)
            }
            Err(e) => {
                error!(file = %item.task.file_name, error = %e, "Download failed");
                item.fail(Stage::Download, e)
            }
        }
    }

    fn download_file(&self, task: &Task, dir: &Path) -> Result<PathBuf, DicomflowError> {
        let dest = dir.join(local_file_name(&task.file_name, &task.staging_key()));
        self.fetch(&task.file_id, &dest)?;
        Ok(dest)
    }

    /// Downloads every file under the study folder into `dir`. A folder
    /// that cannot be listed fails the whole study.
    fn download_study(&self, task: &Task, dir: &Path) -> Result<PathBuf, DicomflowError> {
        let files = RecursiveLister::new(&self.store).list_recursive_strict(
            &task.file_id,
            usize::MAX,
            |folder_id, page_token| {
                self.config.retry.run(|| {
                    self.breaker
                        .call(|| self.store.list_children(folder_id, page_token))
                })
            },
        )?;
        if files.is_empty() {
            return Err(StoreError::NotFound(format!(
                "no files under study folder '{}'",
                task.file_id
            ))
            .into());
        }

        let mut used = HashSet::new();
        for file in &files {
            let name = unique_name(&mut used, &local_file_name(&file.name, &file.id));
            self.fetch(&file.id, &dir.join(name))?;
        }
        debug!(files = files.len(), "Study downloaded");
        Ok(dir.to_path_buf())
    }

    /// One retried, breaker-guarded transfer of `file_id` to `dest`.
    fn fetch(&self, file_id: &str, dest: &Path) -> Result<u64, StoreError> {
        self.config.retry.run(|| {
            self.breaker.call(|| {
                let reader = self.store.get_media(file_id)?;
                let mut reader = DeadlineReader::new(reader, self.config.download_timeout);
                self.staging
                    .write_stream(dest, &mut reader)
                    .map_err(staging_to_store)
            })
        })
    }

    fn validate(&self, mut item: StageItem) -> StageOutcome {
        let Some(input) = item.input_path.clone() else {
            return item.fail(Stage::Validate, "no downloaded input");
        };

        if item.task.is_study() {
            if !input.is_dir() {
                return item.fail(
                    Stage::Validate,
                    format!("staging directory '{}' is missing", input.display()),
                );
            }
            let found = find_dicom_files(&input);
            if found.is_empty() {
                warn!(study = %item.task.file_name, "No DICOM files in study");
                return item.skip("no DICOM files found");
            }
            item.dicom_files = found.len();
            return StageOutcome::Advance(item);
        }

        if let Err(e) = fs::metadata(&input) {
            return item.fail(
                Stage::Validate,
                format!("cannot read '{}': {}", input.display(), e),
            );
        }
        if is_dicom_file(&input) {
            item.dicom_files = 1;
            StageOutcome::Advance(item)
        } else {
            warn!(file = %item.task.file_name, "Invalid DICOM file");
            item.skip("missing DICOM signature")
        }
    }

    fn convert(&self, mut item: StageItem) -> StageOutcome {
        let Some(input) = item.input_path.clone() else {
            return item.fail(Stage::Convert, "no downloaded input");
        };
        let input_dir = if input.is_dir() {
            input
        } else {
            match input.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return item.fail(Stage::Convert, "input has no parent directory"),
            }
        };
        let output_dir = self.staging.output_dir(&item.task.staging_key());

        match self
            .converter
            .convert(&input_dir, &output_dir, self.config.conversion_timeout)
        {
            Ok(artifacts) => {
                info!(
                    volumes = artifacts.primary.len(),
                    dicom_files = item.dicom_files,
                    "Converted"
                );
                item.output_dir = Some(output_dir);
                item.artifacts = Some(artifacts);
                StageOutcome::Advance(item)
            }
            Err(e) => {
                error!(file = %item.task.file_name, error = %e, "Conversion failed");
                item.fail(Stage::Convert, e)
            }
        }
    }

    /// Uploads every artifact of the item. One failed artifact fails the
    /// whole item.
    fn upload(&self, mut item: StageItem) -> StageOutcome {
        let Some(output_dir) = item.output_dir.clone() else {
            return item.fail(Stage::Upload, "no conversion output");
        };
        let Some(artifacts) = item.artifacts.take() else {
            return item.fail(Stage::Upload, "no conversion output");
        };

        let mut uploaded_ids = Vec::new();
        for path in artifacts.artifacts() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| item.task.staging_key());

            match self.push(&name, path) {
                Ok(id) => uploaded_ids.push(id),
                Err(e) => {
                    error!(artifact = %name, error = %e, "Upload failed");
                    return item.fail(Stage::Upload, format!("{}: {}", name, e));
                }
            }
        }

        info!(artifacts = uploaded_ids.len(), "Uploaded");
        let input = item.input_path.clone().unwrap_or_default();
        StageOutcome::Finished(ProcessingResult::completed(
            &item.task,
            input,
            output_dir,
            uploaded_ids,
            item.elapsed_seconds(),
        ))
    }

    fn push(&self, name: &str, path: &Path) -> Result<String, StoreError> {
        self.config.retry.run(|| {
            self.breaker.call(|| {
                let started = Instant::now();
                let id = self.store.create_media(&self.output_folder_id, name, path)?;
                if started.elapsed() > self.config.upload_timeout {
                    warn!(
                        artifact = name,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "Upload exceeded its timeout"
                    );
                }
                Ok(id)
            })
        })
    }

    fn cleanup(&self) {
        let _stage = info_span!("stage", stage = %Stage::Cleanup).entered();
        match self.staging.clean() {
            Ok(removed) => info!(removed, "Staging area cleaned"),
            Err(e) => warn!(error = %e, "Cleanup failed"),
        }
    }
}

/// Keeps the first task for each staging key and fails the rest. Tasks that
/// share a key would share a staging directory, and items in flight are
/// tracked by id.
fn split_duplicates(tasks: Vec<Task>) -> (Vec<Task>, Vec<ProcessingResult>) {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut unique = Vec::with_capacity(tasks.len());
    let mut duplicates = Vec::new();
    for task in tasks {
        match seen.get(&task.staging_key()) {
            Some(first) => {
                warn!(task_id = %task.file_id, first = %first, "Duplicate task in batch");
                duplicates.push(ProcessingResult::failed(
                    &task,
                    None,
                    format!("duplicate task: '{}' collides with '{}'", task.file_id, first),
                    0.0,
                ));
            }
            None => {
                seen.insert(task.staging_key(), task.file_id.clone());
                unique.push(task);
            }
        }
    }
    (unique, duplicates)
}

fn staging_to_store(e: StagingError) -> StoreError {
    match e {
        StagingError::CreateDirectory { path, source }
        | StagingError::WriteFile { path, source }
        | StagingError::Remove { path, source } => StoreError::io(path, source),
    }
}

/// Last path component of a remote name, or `fallback` when it has none.
fn local_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback.replace('/', "_"))
}

/// Appends `_N` until `name` is unused.
fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", name, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Fails reads with `TimedOut` once the deadline has passed. A timeout too
/// large to represent as an `Instant` never expires.
struct DeadlineReader<R> {
    inner: R,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl<R: Read> DeadlineReader<R> {
    fn new(inner: R, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Instant::now().checked_add(timeout),
            timeout,
        }
    }
}

impl<R: Read> Read for DeadlineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("download exceeded {}s", self.timeout.as_secs()),
            ));
        }
        self.inner.read(buf)
    }
}
