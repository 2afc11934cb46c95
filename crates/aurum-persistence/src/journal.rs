//! Append-only JSON Lines journal for price records.
//!
//! One file per UTC day, opened in append mode so an interrupted write
//! only ever damages a single line. Rotation happens lazily on flush when
//! the date changes.

use crate::error::PersistenceResult;
use crate::store::PriceRecord;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    lines_written: usize,
}

/// Daily-rotated JSON Lines appender.
pub struct JsonLinesJournal {
    base_dir: PathBuf,
    buffer: Vec<PriceRecord>,
    max_buffer: usize,
    active: Option<ActiveFile>,
}

impl JsonLinesJournal {
    pub fn new(base_dir: impl Into<PathBuf>, max_buffer: usize) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create journal directory");
        }
        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer),
            max_buffer,
            active: None,
        }
    }

    /// Buffer a record; flushes automatically when the buffer fills.
    pub fn append(&mut self, record: &PriceRecord) -> PersistenceResult<()> {
        self.buffer.push(record.clone());
        if self.buffer.len() >= self.max_buffer {
            self.flush()?;
        }
        Ok(())
    }

    /// Write all buffered records to the current day's file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let needs_rotation = self
            .active
            .as_ref()
            .map(|a| a.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active();
        }
        if self.active.is_none() {
            self.open_for(&today)?;
        }

        let active = self.active.as_mut().expect("active file just ensured");
        for record in self.buffer.drain(..) {
            serde_json::to_writer(&mut active.writer, &record)?;
            active.writer.write_all(b"\n")?;
            active.lines_written += 1;
        }
        active.writer.flush()?;
        Ok(())
    }

    fn open_for(&mut self, date: &str) -> PersistenceResult<()> {
        let path = self.base_dir.join(format!("prices_{date}.jsonl"));
        info!(path = %path.display(), "Opening price journal (append mode)");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active = Some(ActiveFile {
            writer: BufWriter::new(file),
            date: date.to_string(),
            lines_written: 0,
        });
        Ok(())
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on rotation");
            }
            info!(
                date = %active.date,
                lines = active.lines_written,
                "Closed price journal file"
            );
        }
    }
}

impl Drop for JsonLinesJournal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush journal on drop");
        }
        self.close_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurum_core::{Asset, Provider};
    use rust_decimal_macros::dec;

    fn sample() -> PriceRecord {
        PriceRecord {
            provider: Provider::Eodhd,
            asset: Asset::Gold,
            price: dec!(2050.25),
            bid: Some(dec!(2050.0)),
            ask: Some(dec!(2050.5)),
            volume: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn flush_writes_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("aurum-journal-{}", std::process::id()));
        let mut journal = JsonLinesJournal::new(&dir, 100);
        journal.append(&sample()).unwrap();
        journal.append(&sample()).unwrap();
        journal.flush().unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let path = dir.join(format!("prices_{today}.jsonl"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            let parsed: PriceRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.asset, Asset::Gold);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
