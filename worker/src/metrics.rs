use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
    time::{Duration, Instant},
};

use serde::Serialize;

const FILE_NAME: &str = "summaries.jsonl";

/// How often buffered summary lines are forced to disk.
pub const FLUSH_EVERY: Duration = Duration::from_secs(30);

/// One training summary line.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SummaryRecord {
    pub step: u64,
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
}

/// Append-only JSONL sink for a worker's training summaries.
///
/// Records are buffered and flushed on a fixed cadence, so a long run does not
/// pay a disk sync per step while a crash loses at most one flush window.
pub struct SummaryWriter {
    out: BufWriter<File>,
    last_flush: Instant,
    flush_every: Duration,
}

impl SummaryWriter {
    /// Creates a new `SummaryWriter`.
    ///
    /// # Args
    /// * `logdir` - The worker's log directory; created if missing.
    /// * `flush_every` - The flush cadence.
    ///
    /// # Returns
    /// A writer appending to the summary file inside `logdir`.
    pub fn create(logdir: &Path, flush_every: Duration) -> io::Result<Self> {
        fs::create_dir_all(logdir)?;

        let file = File::options()
            .create(true)
            .append(true)
            .open(logdir.join(FILE_NAME))?;

        Ok(Self {
            out: BufWriter::new(file),
            last_flush: Instant::now(),
            flush_every,
        })
    }

    /// Appends one summary line, flushing if the cadence elapsed.
    ///
    /// # Args
    /// * `record` - The summary line to append.
    pub fn record(&mut self, record: &SummaryRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;

        if self.last_flush.elapsed() >= self.flush_every {
            self.flush()?;
        }

        Ok(())
    }

    /// Forces buffered lines to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = env::temp_dir().join("worker_summary_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn records_are_appended_as_json_lines() {
        let dir = scratch_dir("append");
        let mut writer = SummaryWriter::create(&dir, Duration::ZERO).unwrap();

        writer
            .record(&SummaryRecord {
                step: 1,
                epoch: 0,
                loss: 2.5,
                accuracy: 0.25,
            })
            .unwrap();
        writer
            .record(&SummaryRecord {
                step: 2,
                epoch: 0,
                loss: 2.0,
                accuracy: 0.5,
            })
            .unwrap();
        writer.flush().unwrap();

        let contents = fs::read_to_string(dir.join(FILE_NAME)).unwrap();
        let lines: Vec<_> = contents.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"step\":1"));
        assert!(lines[1].contains("\"accuracy\":0.5"));
    }

    #[test]
    fn buffered_lines_wait_for_the_cadence() {
        let dir = scratch_dir("buffered");
        let mut writer = SummaryWriter::create(&dir, Duration::from_secs(3600)).unwrap();

        writer
            .record(&SummaryRecord {
                step: 1,
                epoch: 0,
                loss: 1.0,
                accuracy: 0.0,
            })
            .unwrap();

        // Nothing hit the disk yet; the explicit flush is what lands it.
        let before = fs::read_to_string(dir.join(FILE_NAME)).unwrap();
        assert!(before.is_empty());

        writer.flush().unwrap();
        let after = fs::read_to_string(dir.join(FILE_NAME)).unwrap();
        assert_eq!(after.lines().count(), 1);
    }
}
