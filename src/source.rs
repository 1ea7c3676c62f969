//! Record sources: where batches of raw records come from.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use crate::error::Result;
use crate::model::Record;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Supplies records in batches. An empty batch means end-of-input; every
/// call after that must also return an empty batch.
pub trait RecordSource: Send + 'static {
    fn next_batch(&mut self) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Reads delimiter-separated lines, `batch_size` records at a time.
/// Blank lines are skipped.
pub struct LineSource<R> {
    lines: Lines<R>,
    batch_size: usize,
    delimiter: char,
    done: bool,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, batch_size: usize, delimiter: char) -> Self {
        Self {
            lines: reader.lines(),
            batch_size: batch_size.max(1),
            delimiter,
            done: false,
        }
    }
}

impl LineSource<BufReader<File>> {
    /// Open a file for reading.
    pub async fn open(path: impl AsRef<Path>, batch_size: usize, delimiter: char) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self::new(BufReader::new(file), batch_size, delimiter))
    }
}

impl<R> RecordSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_batch(&mut self) -> Result<Vec<Record>> {
        let mut batch = Vec::new();
        while !self.done && batch.len() < self.batch_size {
            match self.lines.next_line().await? {
                Some(line) => {
                    let line = line.trim_end_matches('\r');
                    if !line.trim().is_empty() {
                        batch.push(Record::parse(line, self.delimiter));
                    }
                }
                None => self.done = true,
            }
        }
        debug!(records = batch.len(), "read batch");
        Ok(batch)
    }
}

/// Serves pre-built batches, then end-of-input.
#[derive(Debug, Default)]
pub struct VecSource {
    batches: VecDeque<Vec<Record>>,
}

impl VecSource {
    pub fn new(batches: impl IntoIterator<Item = Vec<Record>>) -> Self {
        Self {
            // Empty batches would read as end-of-input; drop them.
            batches: batches.into_iter().filter(|b| !b.is_empty()).collect(),
        }
    }
}

impl RecordSource for VecSource {
    async fn next_batch(&mut self) -> Result<Vec<Record>> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}
