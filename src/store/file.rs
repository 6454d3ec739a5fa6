use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs4::fs_std::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{newest_first, JobFilter, JobMutation, JobRepository};
use crate::error::{Result, StoreError};
use crate::state_machine::{Job, JobId};

/// Job store persisted as a JSON array of job records.
///
/// The file is the only state; each call reads it, and writes go through a
/// sibling `.tmp` file renamed over the original. Every load → mutate → save
/// sequence runs under an exclusive advisory lock on `<path>.lock`, so
/// separate processes sharing the file cannot interleave their writes.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileJobStore {
    /// Open (or lazily create) the store at `path`. Existing records are
    /// validated up front so a corrupt file is reported at startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            guard: Mutex::new(()),
        };
        let jobs = store.load()?;
        debug!(path = %store.path.display(), jobs = jobs.len(), "opened job file");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = read_json_file(&self.path)?.unwrap_or_default();
        for job in &jobs {
            job.check_invariants().map_err(StoreError::Corrupt)?;
        }
        Ok(jobs)
    }

    fn save(&self, jobs: &[Job]) -> Result<()> {
        write_json_file(&self.path, &jobs)?;
        Ok(())
    }
}

impl JobRepository for FileJobStore {
    fn get(&self, id: &JobId) -> Result<Job> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.load()?
            .into_iter()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()).into())
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let jobs = self.load()?;
        Ok(newest_first(jobs.iter(), filter))
    }

    fn insert(&self, job: Job) -> Result<Job> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _locked = lock_file(&self.path)?;
        let mut jobs = self.load()?;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(StoreError::Duplicate(job.id).into());
        }
        jobs.push(job.clone());
        self.save(&jobs)?;
        Ok(job)
    }

    fn update(&self, id: &JobId, mutate: &mut JobMutation<'_>) -> Result<Job> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _locked = lock_file(&self.path)?;
        let mut jobs = self.load()?;
        let slot = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        mutate(slot)?;
        let updated = slot.clone();
        self.save(&jobs)?;
        Ok(updated)
    }
}

/// Exclusive advisory lock on the sibling `<path>.lock` file. Released when
/// dropped. The data file itself is replaced by rename, so it cannot carry
/// the lock.
#[derive(Debug)]
pub(crate) struct FileLock {
    _file: File,
}

pub(crate) fn lock_file(path: &Path) -> std::result::Result<FileLock, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(PathBuf::from(lock_path))?;
    file.lock_exclusive()?;
    Ok(FileLock { _file: file })
}

/// Read and parse a JSON file, `None` if it does not exist.
pub(crate) fn read_json_file<T: DeserializeOwned>(
    path: &Path,
) -> std::result::Result<Option<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `value` as pretty JSON via a temporary file and rename.
pub(crate) fn write_json_file<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> std::result::Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::error::BoardError;
    use crate::state_machine::{JobStatus, StateMachine, Transition};
    use crate::store::testing::{self, sample_job};

    #[test]
    fn file_store_honours_repository_contract() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        testing::run_contract(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::new(FileJobStore::open(dir.path().join(format!("jobs-{n}.json"))).unwrap())
        });
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path().join("nested/jobs.json")).unwrap();
        assert!(store.list(&JobFilter::default()).unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn survives_reopen_with_nullable_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = FileJobStore::open(&path).unwrap();
        let open = store.insert(sample_job("creator-1", "open")).unwrap();
        let claimed = store.insert(sample_job("creator-1", "claimed")).unwrap();
        store
            .update(&claimed.id, &mut |j| {
                StateMachine::apply(
                    j,
                    &Transition::Claim {
                        editor_id: "editor-1".into(),
                    },
                    Utc::now(),
                )
            })
            .unwrap();
        drop(store);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let records = raw.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0]["editorId"].is_null());
        assert!(records[0]["submissionUrl"].is_null());
        assert_eq!(records[1]["editorId"], "editor-1");

        let reopened = FileJobStore::open(&path).unwrap();
        assert_eq!(reopened.get(&open.id).unwrap(), open);
        assert_eq!(
            reopened.get(&claimed.id).unwrap().status,
            JobStatus::Claimed
        );
    }

    #[test]
    fn corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let mut job = sample_job("creator-1", "bad");
        job.editor_id = Some("editor-1".into());
        write_json_file(&path, &vec![job]).unwrap();

        let err = FileJobStore::open(&path).unwrap_err();
        assert!(matches!(err, BoardError::Store(StoreError::Corrupt(_))));
    }

    #[test]
    fn two_handles_on_one_file_do_not_both_claim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let a = FileJobStore::open(&path).unwrap();
        let b = FileJobStore::open(&path).unwrap();
        let job = a.insert(sample_job("creator-1", "race")).unwrap();
        let (inside_tx, inside_rx) = std::sync::mpsc::channel();

        let (a_result, b_result) = std::thread::scope(|s| {
            let first = s.spawn(|| {
                a.update(&job.id, &mut |j| {
                    inside_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    StateMachine::apply(j, &testing::claim("editor-1"), Utc::now())
                })
            });
            let (b, job_id) = (&b, &job.id);
            let second = s.spawn(move || {
                inside_rx.recv().unwrap();
                b.update(job_id, &mut |j| {
                    StateMachine::apply(j, &testing::claim("editor-2"), Utc::now())
                })
            });
            (first.join().unwrap(), second.join().unwrap())
        });

        assert!(a_result.is_ok());
        assert!(matches!(
            b_result,
            Err(BoardError::InvalidTransition {
                current: JobStatus::Claimed,
                ..
            })
        ));
        assert_eq!(
            b.get(&job.id).unwrap().editor_id.as_deref(),
            Some("editor-1")
        );
    }

    #[test]
    fn garbage_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileJobStore::open(&path).unwrap_err();
        assert!(matches!(err, BoardError::Store(StoreError::Json(_))));
    }
}
