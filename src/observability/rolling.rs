//! Rolling file writer for the file sink.
//!
//! A path template such as `logs/app-jdoe-4711-.log` produces files named
//! `app-jdoe-4711-20240501.log`, then `app-jdoe-4711-20240501_001.log` and so
//! on when the size cap is reached. A new day starts a new file. Only the
//! newest files matching the template are retained.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};

/// Size cap before rolling to the next file of the same day.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Number of files kept, including the one being written.
pub const RETAINED_FILE_COUNT: usize = 7;

const LOG_EXTENSION: &str = ".log";
const DATE_FORMAT: &str = "%Y%m%d";

/// Rollover limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingPolicy {
    pub max_file_size: u64,
    pub retained_files: usize,
}

impl Default for RollingPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            retained_files: RETAINED_FILE_COUNT,
        }
    }
}

struct RolledFile {
    date: NaiveDate,
    sequence: u32,
    name: String,
}

pub struct RollingFileWriter {
    dir: PathBuf,
    prefix: String,
    policy: RollingPolicy,
    period: NaiveDate,
    sequence: u32,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileWriter {
    pub fn open(template: &Path, policy: RollingPolicy) -> io::Result<Self> {
        Self::open_at(template, policy, Local::now().date_naive())
    }

    /// Open for a given day, appending to that day's newest file if present.
    pub fn open_at(template: &Path, policy: RollingPolicy, today: NaiveDate) -> io::Result<Self> {
        let file_name = template
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;
        let prefix = file_name
            .strip_suffix(LOG_EXTENSION)
            .unwrap_or(file_name)
            .to_string();
        let dir = match template.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut writer = Self {
            dir,
            prefix,
            policy: RollingPolicy {
                retained_files: policy.retained_files.max(1),
                ..policy
            },
            period: today,
            sequence: 0,
            file: None,
            current_size: 0,
        };
        writer.sequence = writer.latest_sequence(today)?;
        writer.open_current()?;
        if writer.current_size >= writer.policy.max_file_size {
            writer.sequence += 1;
            writer.open_current()?;
        }
        writer.enforce_retention()?;
        Ok(writer)
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(self.file_name(self.period, self.sequence))
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Flush and release the file handle. Later writes fail.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Write as if the current day were `today`.
    pub fn write_on(&mut self, today: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            return Err(io::Error::new(io::ErrorKind::Other, "log file closed"));
        }

        let over_size = self.current_size > 0
            && self.current_size + buf.len() as u64 > self.policy.max_file_size;
        if today != self.period || over_size {
            self.roll(today)?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        file.write_all(buf)?;
        self.current_size += buf.len() as u64;
        Ok(buf.len())
    }

    fn file_name(&self, date: NaiveDate, sequence: u32) -> String {
        let date = date.format(DATE_FORMAT);
        if sequence == 0 {
            format!("{}{date}{LOG_EXTENSION}", self.prefix)
        } else {
            format!("{}{date}_{sequence:03}{LOG_EXTENSION}", self.prefix)
        }
    }

    fn roll(&mut self, today: NaiveDate) -> io::Result<()> {
        if today != self.period {
            self.period = today;
            self.sequence = 0;
        } else {
            self.sequence += 1;
        }
        self.open_current()?;
        self.enforce_retention()
    }

    fn open_current(&mut self) -> io::Result<()> {
        if let Some(mut old) = self.file.take() {
            let _ = old.flush();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        self.current_size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Files produced by this template, oldest first.
    fn matching_files(&self) -> io::Result<Vec<RolledFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(file) = self.parse_file_name(name) {
                files.push(file);
            }
        }
        files.sort_by_key(|f| (f.date, f.sequence));
        Ok(files)
    }

    /// Inverse of `file_name`. `None` for files this template did not produce.
    fn parse_file_name(&self, name: &str) -> Option<RolledFile> {
        let rest = name.strip_prefix(&self.prefix)?.strip_suffix(LOG_EXTENSION)?;
        let (day, tail) = (rest.get(..8)?, rest.get(8..)?);
        if !day.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(day, DATE_FORMAT).ok()?;
        let sequence = if tail.is_empty() {
            0
        } else {
            tail.strip_prefix('_')?.parse().ok()?
        };
        Some(RolledFile {
            date,
            sequence,
            name: name.to_string(),
        })
    }

    fn latest_sequence(&self, date: NaiveDate) -> io::Result<u32> {
        let latest = self
            .matching_files()?
            .iter()
            .filter(|f| f.date == date)
            .map(|f| f.sequence)
            .max()
            .unwrap_or(0);
        Ok(latest)
    }

    fn enforce_retention(&self) -> io::Result<()> {
        let files = self.matching_files()?;
        let excess = files.len().saturating_sub(self.policy.retained_files);
        for file in &files[..excess] {
            match fs::remove_file(self.dir.join(&file.name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Cloneable handle so the sink can close the file the background writer uses.
#[derive(Clone)]
pub struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileWriter>>,
}

impl SharedRollingWriter {
    pub fn new(writer: RollingFileWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, RollingFileWriter>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))
    }

    pub fn close(&self) -> io::Result<()> {
        self.lock()?.close()
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|w| w.is_open()).unwrap_or(false)
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().ok().map(|w| w.current_path())
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_file_name_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app-jdoe-42-.log");
        let writer = RollingFileWriter::open_at(&template, RollingPolicy::default(), day(1)).unwrap();

        assert_eq!(writer.current_path(), dir.path().join("app-jdoe-42-20240501.log"));
        assert!(writer.current_path().exists());
    }

    #[test]
    fn test_rolls_on_size() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app-.log");
        let policy = RollingPolicy {
            max_file_size: 10,
            retained_files: 7,
        };
        let mut writer = RollingFileWriter::open_at(&template, policy, day(1)).unwrap();

        writer.write_on(day(1), b"12345678").unwrap();
        writer.write_on(day(1), b"12345678").unwrap();
        writer.write_on(day(1), b"12345678").unwrap();

        assert_eq!(
            listing(dir.path()),
            vec!["app-20240501.log", "app-20240501_001.log", "app-20240501_002.log"]
        );
    }

    #[test]
    fn test_oversized_record_is_written_whole() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app-.log");
        let policy = RollingPolicy {
            max_file_size: 4,
            retained_files: 7,
        };
        let mut writer = RollingFileWriter::open_at(&template, policy, day(1)).unwrap();

        assert_eq!(writer.write_on(day(1), b"0123456789").unwrap(), 10);
        assert_eq!(listing(dir.path()), vec!["app-20240501.log"]);
    }

    #[test]
    fn test_rolls_on_day_change() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app-.log");
        let mut writer = RollingFileWriter::open_at(&template, RollingPolicy::default(), day(1)).unwrap();

        writer.write_on(day(1), b"first\n").unwrap();
        writer.write_on(day(2), b"second\n").unwrap();

        assert_eq!(listing(dir.path()), vec!["app-20240501.log", "app-20240502.log"]);
        let second = fs::read_to_string(dir.path().join("app-20240502.log")).unwrap();
        assert_eq!(second, "second\n");
    }

    #[test]
    fn test_retention_deletes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        for d in 1..=9 {
            fs::write(dir.path().join(format!("app-202404{d:02}.log")), b"old").unwrap();
        }
        fs::write(dir.path().join("other-20240401.log"), b"keep").unwrap();

        let template = dir.path().join("app-.log");
        let _writer = RollingFileWriter::open_at(&template, RollingPolicy::default(), day(1)).unwrap();

        let names = listing(dir.path());
        let ours: Vec<_> = names.iter().filter(|n| n.starts_with("app-")).collect();
        assert_eq!(ours.len(), RETAINED_FILE_COUNT);
        assert!(!names.contains(&"app-20240401.log".to_string()));
        assert!(!names.contains(&"app-20240403.log".to_string()));
        assert!(names.contains(&"app-20240501.log".to_string()));
        assert!(names.contains(&"other-20240401.log".to_string()));
    }

    #[test]
    fn test_reopen_appends_to_latest_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app-20240501.log"), b"a").unwrap();
        fs::write(dir.path().join("app-20240501_003.log"), b"b").unwrap();

        let template = dir.path().join("app-.log");
        let writer = RollingFileWriter::open_at(&template, RollingPolicy::default(), day(1)).unwrap();
        assert_eq!(writer.current_path(), dir.path().join("app-20240501_003.log"));
    }

    #[test]
    fn test_sequences_past_999_order_numerically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app-20240501_101.log"), b"old").unwrap();
        fs::write(dir.path().join("app-20240501_1000.log"), b"new").unwrap();

        let template = dir.path().join("app-.log");
        let policy = RollingPolicy {
            retained_files: 1,
            ..RollingPolicy::default()
        };
        let writer = RollingFileWriter::open_at(&template, policy, day(1)).unwrap();

        assert_eq!(writer.current_path(), dir.path().join("app-20240501_1000.log"));
        assert_eq!(listing(dir.path()), vec!["app-20240501_1000.log"]);
    }

    #[test]
    fn test_close_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app-.log");
        let writer = RollingFileWriter::open_at(&template, RollingPolicy::default(), day(1)).unwrap();
        let shared = SharedRollingWriter::new(writer);

        let mut handle = shared.clone();
        handle.write_all(b"line\n").unwrap();
        assert!(shared.is_open());

        shared.close().unwrap();
        assert!(!shared.is_open());
        assert!(handle.write_all(b"late\n").is_err());
    }
}
