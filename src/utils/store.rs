#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use log::info;
use serde::{Deserialize, Serialize};

use crate::utils::config::INTAKE_DIRS;
use crate::utils::errors::Errors;

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Store file location, relative to the data directory.
const APPLICATIONS_FILE: &str = "/applications.txt";

// ***************************************************************************
//                               Record Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// ApplicationRecord:
// ---------------------------------------------------------------------------
/** The single persisted entity, stored as one JSON object per line.  Records
 * are written once and never updated or deleted.  The name, email and phone
 * fields are always present and non-empty after validation; everything else
 * is optional metadata captured from the request.
 */
#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub plan: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub ip: Option<String>,
    pub created_at: String,
}

// ***************************************************************************
//                               Store Struct
// ***************************************************************************
// ---------------------------------------------------------------------------
// ApplicationStore:
// ---------------------------------------------------------------------------
/** Process-wide owner of the append-only applications file.  The file is
 * opened once at startup and every append is serialized through the mutex,
 * so concurrent requests never interleave bytes within a line.
 */
#[derive(Debug)]
pub struct ApplicationStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl ApplicationStore {
    // -----------------------------------------------------------------------
    // open:
    // -----------------------------------------------------------------------
    /** Open the store file in append mode, creating it empty if missing. */
    pub fn open(path: &Path) -> Result<ApplicationStore> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ApplicationStore { path: path.to_path_buf(), file: Mutex::new(file) })
    }

    // -----------------------------------------------------------------------
    // path:
    // -----------------------------------------------------------------------
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -----------------------------------------------------------------------
    // append:
    // -----------------------------------------------------------------------
    /** Append a single record as one NDJSON line.  The serialized record and
     * its trailing newline are written with a single call under the lock and
     * synced to disk before the lock is released.
     */
    pub fn append(&self, record: &ApplicationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock()
            .map_err(|_| anyhow!(Errors::StoreError("append handle poisoned".to_string())))?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // read_all:
    // -----------------------------------------------------------------------
    /** Read every stored record, one JSON object per line.  Used at startup
     * to report the store size; a line that does not parse is an error, not
     * something to skip silently.
     */
    pub fn read_all(path: &Path) -> Result<Vec<ApplicationRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = vec![];
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ApplicationRecord = serde_json::from_str(&line)?;
            records.push(record);
        }
        Ok(records)
    }
}

// ***************************************************************************
//                             Public Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_store:
// ---------------------------------------------------------------------------
/** Make sure the applications file exists before the listener binds and open
 * the process-wide append handle.  A file that cannot be created or whose
 * contents do not parse aborts startup.
 */
pub fn init_store() -> Result<ApplicationStore> {
    let path_str = INTAKE_DIRS.data_dir.clone() + APPLICATIONS_FILE;
    let path = Path::new(&path_str);
    let store = ApplicationStore::open(path)?;
    let existing = ApplicationStore::read_all(store.path())?;
    info!("Store {} opened with {} existing record(s).", store.path().display(), existing.len());
    Ok(store)
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(name: &str) -> ApplicationRecord {
        ApplicationRecord {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            phone: "555-1234".to_string(),
            plan: None,
            user_agent: None,
            referrer: None,
            ip: None,
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn open_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("applications.txt");
        let store = ApplicationStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(ApplicationStore::read_all(store.path()).unwrap().is_empty());
    }

    #[test]
    fn append_writes_one_parseable_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("applications.txt");
        let store = ApplicationStore::open(&path).unwrap();
        store.append(&sample("jane")).unwrap();
        store.append(&sample("joe")).unwrap();

        // The raw file is valid NDJSON: every line parses independently.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }

        let records = ApplicationStore::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "jane");
        assert_eq!(records[1].email, "joe@example.com");
        assert_eq!(records[0].plan, None);
    }

    #[test]
    fn reopened_store_appends_after_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("applications.txt");
        {
            let store = ApplicationStore::open(&path).unwrap();
            store.append(&sample("first")).unwrap();
        }
        let store = ApplicationStore::open(&path).unwrap();
        store.append(&sample("second")).unwrap();

        let records = ApplicationStore::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "first");
        assert_eq!(records[1].name, "second");
    }

    #[test]
    fn corrupt_line_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("applications.txt");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(ApplicationStore::read_all(&path).is_err());
    }
}
