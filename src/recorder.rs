// src/recorder.rs
// 录制：每行 timestamp\tch1..\tchC，追加写入
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::acquisition::Row;

pub struct DataRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    rows_written: u64,
}

impl DataRecorder {
    /// Opens `path` for appending, creating it when missing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("recording to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn write_row(&mut self, row: &Row) -> io::Result<()> {
        write!(self.writer, "{}", row.timestamp)?;
        for value in &row.values {
            write!(self.writer, "\t{value}")?;
        }
        writeln!(self.writer)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_rows<'a, I>(&mut self, rows: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flushes buffered rows to disk.
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        info!(
            "recording saved: {} rows in {}",
            self.rows_written,
            self.path.display()
        );
        Ok(self.rows_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_tab_separated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tsv");
        let mut recorder = DataRecorder::create(&path).unwrap();
        let rows = vec![
            Row { timestamp: 0, values: vec![1, -2, 3] },
            Row { timestamp: 2000, values: vec![4, 5, -6] },
        ];
        recorder.write_rows(&rows).unwrap();
        assert_eq!(recorder.finish().unwrap(), 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0\t1\t-2\t3\n2000\t4\t5\t-6\n");
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.tsv");
        for ts in [1, 2] {
            let mut recorder = DataRecorder::create(&path).unwrap();
            recorder.write_row(&Row { timestamp: ts, values: vec![0] }).unwrap();
            recorder.finish().unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t0\n2\t0\n");
    }
}
