use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn start(&self, _source: &str, _dest: &Path) {}
    fn done(&self, _source: &str, _bytes: u64) {}
    fn error(&self, _context: &str, _subject: &str, _msg: &str) {}
    fn cleanup(&self, _path: &Path) {}
    fn archived(&self, _path: &Path) {}
    fn extracted(&self, _path: &Path) {}
    fn summary(&self, _succeeded: u64, _failed: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, source: &str, dest: &Path) {
        self.line(&format!("START src={} dst={}", source, dest.display()));
    }
    fn done(&self, source: &str, bytes: u64) {
        self.line(&format!("DONE src={source} bytes={bytes}"));
    }
    fn error(&self, context: &str, subject: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} subject={subject} msg={msg}"));
    }
    fn cleanup(&self, path: &Path) {
        self.line(&format!("CLEANUP path={}", path.display()));
    }
    fn archived(&self, path: &Path) {
        self.line(&format!("PACK path={}", path.display()));
    }
    fn extracted(&self, path: &Path) {
        self.line(&format!("EXTRACT path={}", path.display()));
    }
    fn summary(&self, succeeded: u64, failed: u64, seconds: f64) {
        self.line(&format!(
            "SUMMARY ok={succeeded} failed={failed} seconds={seconds:.3}"
        ));
    }
}
