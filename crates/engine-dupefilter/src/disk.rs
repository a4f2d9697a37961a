//! Disk-backed fingerprint filter (spec.md §4.1): an append-only fingerprint
//! log on a job directory, loaded into an in-memory set on restart.
//! Mirrors spec.md §6's persisted-state format: "newline-delimited hex".

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::fingerprint;
use engine_protocol::Request;

use crate::{FingerprintFilter, ReleaseReason};

struct State {
    seen: HashSet<String>,
    log: File,
}

pub struct DiskFilter {
    state: Mutex<State>,
    significant_headers: Vec<String>,
}

impl DiskFilter {
    /// Opens (or creates) `requests.seen` under `job_dir`, replaying any
    /// existing entries into memory.
    pub fn open(job_dir: impl AsRef<Path>) -> Result<Self, FilterError> {
        let job_dir = job_dir.as_ref();
        fs::create_dir_all(job_dir)?;
        let path: PathBuf = job_dir.join("requests.seen");

        let mut seen = HashSet::new();
        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    seen.insert(trimmed.to_string());
                }
            }
        }

        let log = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            state: Mutex::new(State { seen, log }),
            significant_headers: Vec::new(),
        })
    }

    fn fingerprint(&self, request: &Request) -> String {
        let headers: Vec<&str> = self.significant_headers.iter().map(String::as_str).collect();
        fingerprint::compute_for_request(request, &headers)
    }
}

#[async_trait]
impl FingerprintFilter for DiskFilter {
    async fn seen(&self, request: &Request) -> Result<bool, FilterError> {
        let fp = self.fingerprint(request);
        let mut state = self.state.lock().expect("dupefilter lock poisoned");
        if state.seen.contains(&fp) {
            return Ok(true);
        }
        writeln!(state.log, "{fp}")?;
        state.log.flush()?;
        state.seen.insert(fp);
        Ok(false)
    }

    async fn release(&self, request: &Request, _reason: ReleaseReason) {
        let fp = self.fingerprint(request);
        let mut state = self.state.lock().expect("dupefilter lock poisoned");
        // The append-only log keeps the stale entry; only the in-memory set
        // (which `seen` actually consults) needs the retraction. A restart
        // would still replay the log and see it as seen, which is
        // acceptable: release() only needs to hold within a single run.
        state.seen.remove(&fp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_protocol::Method;

    fn request(url: &str, sequence: u64) -> Request {
        Request::new(url::Url::parse(url).unwrap(), sequence)
            .method(Method::Get)
            .build()
    }

    #[tokio::test]
    async fn persists_and_reloads_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let req = request("http://x/", 0);

        {
            let filter = DiskFilter::open(dir.path()).unwrap();
            assert!(!filter.seen(&req).await.unwrap());
        }

        let filter = DiskFilter::open(dir.path()).unwrap();
        assert!(filter.seen(&req).await.unwrap());
    }
}
