/*
 * Day-indexed output file management
 *
 * Each instance writes to `directory/<base>-<YYYY-MM-DD><ext>`. Before any
 * flush writes, the rotator checks that the open file still belongs to the
 * current local day and swaps it for the right one if not. A target file
 * last modified today is continued in append mode; anything older is
 * truncated so every day starts fresh.
 *
 * A write that fails partway through a line is cut back to the end of the
 * last complete line, so a retry never leaves a fragment in the file.
 */

use chrono::{DateTime, Local, NaiveDate};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{LogError, Result};
use crate::name::LogName;

pub(crate) fn day_marker(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub(crate) struct FileRotator {
    directory: PathBuf,
    name: LogName,
    file: Option<File>,
    day: Option<NaiveDate>,
    path: Option<PathBuf>,
}

impl FileRotator {
    pub fn new(directory: PathBuf, name: LogName) -> Self {
        FileRotator {
            directory,
            name,
            file: None,
            day: None,
            path: None,
        }
    }

    /// Path of the current day file, once one has been resolved
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Make sure the open file matches the day of `now`
    pub fn check_rotation(&mut self, now: &DateTime<Local>) -> Result<()> {
        if self.file.is_some() && self.day == Some(now.date_naive()) {
            return Ok(());
        }
        self.reopen(now)
    }

    /// Close the current file and open the one for the day of `now`
    pub fn reopen(&mut self, now: &DateTime<Local>) -> Result<()> {
        self.file = None;

        let today = now.date_naive();
        let path = self.directory.join(self.name.file_name(&day_marker(today)));
        self.day = Some(today);
        self.path = Some(path.clone());

        fs::create_dir_all(&self.directory).map_err(|e| {
            LogError::Configuration(format!(
                "cannot create log directory '{}': {}",
                self.directory.display(),
                e
            ))
        })?;

        let append = modified_on(&path, today);
        let mut options = OpenOptions::new();
        if append {
            options.create(true).append(true);
        } else {
            options.create(true).write(true).truncate(true);
        }

        let file = options
            .open(&path)
            .map_err(|source| LogError::FileOpen { path: path.clone(), source })?;
        debug!(path = %path.display(), append, "opened log file");

        self.file = Some(file);
        Ok(())
    }

    /// Write lines in order, popping each one once it is fully written.
    ///
    /// On error the failed line and everything after it stay in `lines`, and
    /// none of the failed line's bytes remain in the file.
    pub fn write_lines(&mut self, lines: &mut VecDeque<String>) -> Result<()> {
        let path = self.path.clone().unwrap_or_default();
        let Some(file) = self.file.as_mut() else {
            return Err(LogError::Write {
                path,
                source: io::Error::new(io::ErrorKind::NotConnected, "no log file is open"),
            });
        };

        file.metadata()
            .and_then(|meta| write_batch(file, meta.len(), lines))
            .map_err(|source| LogError::Write { path, source })
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Output that can be cut back to an earlier length
trait Rewind {
    fn rewind_to(&mut self, len: u64) -> io::Result<()>;
}

impl Rewind for File {
    fn rewind_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        // Files opened without append keep their own cursor
        self.seek(SeekFrom::Start(len)).map(|_| ())
    }
}

// `committed` is the output length before the first line
fn write_batch<W: Write + Rewind>(
    out: &mut W,
    mut committed: u64,
    lines: &mut VecDeque<String>,
) -> io::Result<()> {
    while let Some(line) = lines.front() {
        if let Err(e) = out.write_all(line.as_bytes()) {
            if let Err(rewind) = out.rewind_to(committed) {
                warn!(error = %rewind, "could not remove a partially written line");
            }
            return Err(e);
        }
        committed += line.len() as u64;
        lines.pop_front();
    }

    out.flush()
}

// Whether the file at `path` was last modified on the local date `today`
fn modified_on(path: &Path, today: NaiveDate) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|modified| DateTime::<Local>::from(modified).date_naive() == today)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn rotator(dir: &TempDir) -> FileRotator {
        FileRotator::new(dir.path().join("Log"), LogName::new("app").unwrap())
    }

    fn lines(items: &[&str]) -> VecDeque<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn creates_directory_and_day_file() {
        let dir = TempDir::new().unwrap();
        let mut rotator = rotator(&dir);
        let now = Local.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();

        rotator.check_rotation(&now).unwrap();
        let expected = dir.path().join("Log").join("app-2024-03-09.log");
        assert_eq!(rotator.path(), Some(expected.as_path()));
        assert!(expected.exists());
    }

    #[test]
    fn new_day_switches_files() {
        let dir = TempDir::new().unwrap();
        let mut rotator = rotator(&dir);
        let day_one = Local.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        let day_two = Local.with_ymd_and_hms(2024, 3, 10, 0, 1, 0).unwrap();

        rotator.check_rotation(&day_one).unwrap();
        rotator.write_lines(&mut lines(&["one\n"])).unwrap();
        rotator.check_rotation(&day_two).unwrap();
        rotator.write_lines(&mut lines(&["two\n"])).unwrap();

        let log_dir = dir.path().join("Log");
        assert_eq!(fs::read_to_string(log_dir.join("app-2024-03-09.log")).unwrap(), "one\n");
        assert_eq!(fs::read_to_string(log_dir.join("app-2024-03-10.log")).unwrap(), "two\n");
    }

    #[test]
    fn same_day_check_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let mut rotator = rotator(&dir);
        let now = Local::now();

        rotator.check_rotation(&now).unwrap();
        rotator.write_lines(&mut lines(&["a\n"])).unwrap();
        rotator.check_rotation(&now).unwrap();
        rotator.write_lines(&mut lines(&["b\n"])).unwrap();

        assert_eq!(fs::read_to_string(rotator.path().unwrap()).unwrap(), "a\nb\n");
    }

    #[test]
    fn appends_to_file_modified_today() {
        let dir = TempDir::new().unwrap();
        let now = Local::now();
        let log_dir = dir.path().join("Log");
        fs::create_dir_all(&log_dir).unwrap();
        let path = log_dir.join(format!("app-{}.log", day_marker(now.date_naive())));
        fs::write(&path, "earlier\n").unwrap();

        let mut rotator = rotator(&dir);
        rotator.check_rotation(&now).unwrap();
        rotator.write_lines(&mut lines(&["later\n"])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }

    #[test]
    fn truncates_file_from_an_older_day() {
        let dir = TempDir::new().unwrap();
        let now = Local::now();
        let log_dir = dir.path().join("Log");
        fs::create_dir_all(&log_dir).unwrap();
        let path = log_dir.join(format!("app-{}.log", day_marker(now.date_naive())));
        fs::write(&path, "last week\n").unwrap();
        let stale = File::options().write(true).open(&path).unwrap();
        stale
            .set_modified(SystemTime::now() - Duration::from_secs(7 * 24 * 3600))
            .unwrap();
        drop(stale);

        let mut rotator = rotator(&dir);
        rotator.check_rotation(&now).unwrap();
        rotator.write_lines(&mut lines(&["fresh\n"])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("Log");
        fs::write(&blocker, "not a directory").unwrap();

        let mut rotator = rotator(&dir);
        let err = rotator.check_rotation(&Local::now()).unwrap_err();
        assert!(matches!(err, LogError::Configuration(_)));
        assert!(!rotator.is_open());

        let mut pending = lines(&["kept\n"]);
        assert!(rotator.write_lines(&mut pending).is_err());
        assert_eq!(pending.len(), 1);
    }

    // Accepts `room` more bytes, then fails
    struct ShortDisk {
        data: Vec<u8>,
        room: usize,
    }

    impl Write for ShortDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::other("no space left"));
            }
            let n = buf.len().min(self.room);
            self.data.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Rewind for ShortDisk {
        fn rewind_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn retry_after_a_cut_short_line_writes_it_once() {
        let mut disk = ShortDisk { data: Vec::new(), room: 7 };
        let mut pending = lines(&["first\n", "second\n"]);

        assert!(write_batch(&mut disk, 0, &mut pending).is_err());
        assert_eq!(disk.data, b"first\n");
        assert_eq!(pending, lines(&["second\n"]));

        disk.room = 100;
        let committed = disk.data.len() as u64;
        write_batch(&mut disk, committed, &mut pending).unwrap();
        assert_eq!(disk.data, b"first\nsecond\n");
        assert!(pending.is_empty());
    }

    #[test]
    fn rewinding_a_file_moves_the_cursor_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rewind.log");
        let mut file = File::create(&path).unwrap();

        file.write_all(b"kept\nfragm").unwrap();
        file.rewind_to(5).unwrap();
        file.write_all(b"next\n").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\nnext\n");
    }
}
