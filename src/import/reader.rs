//! Streaming feed file reader.
//!
//! Each feed file is read on a blocking task: rows are pulled through the
//! batcher, the rows of one batch are deserialized in parallel, and finished
//! batches travel to the async writer over a bounded channel. The reader
//! suspends when the channel is full, so peak memory stays at a few batches
//! regardless of file size.

use crate::error::ImportError;
use crate::import::batch::{BatchPolicy, BatchedExt};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{Receiver, Sender};

/// The fixed set of feed files the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFile {
    Agency,
    Calendar,
    CalendarDates,
    Stops,
    Routes,
    Shapes,
    Trips,
    StopTimes,
}

impl FeedFile {
    pub const fn file_name(self) -> &'static str {
        match self {
            FeedFile::Agency => "agency.txt",
            FeedFile::Calendar => "calendar.txt",
            FeedFile::CalendarDates => "calendar_dates.txt",
            FeedFile::Stops => "stops.txt",
            FeedFile::Routes => "routes.txt",
            FeedFile::Shapes => "shapes.txt",
            FeedFile::Trips => "trips.txt",
            FeedFile::StopTimes => "stop_times.txt",
        }
    }

    /// Required files abort the agency import when absent; optional ones
    /// are skipped with zero rows.
    pub const fn required(self) -> bool {
        !matches!(self, FeedFile::CalendarDates | FeedFile::Shapes)
    }
}

/// A local directory of extracted feed files, as produced by the download
/// and unzip step upstream of the importer.
#[derive(Debug, Clone)]
pub struct FeedDirectory {
    root: PathBuf,
}

impl FeedDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, file: FeedFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    pub fn contains(&self, file: FeedFile) -> bool {
        self.path(file).exists()
    }

    /// Start reading `file` in batches of `batch_size` rows on a blocking
    /// task, returning the consuming end of the batch channel.
    ///
    /// Fails immediately with [`ImportError::FileNotFound`] when the file is
    /// absent; the caller decides whether that is fatal.
    pub fn read_batches<R>(
        &self,
        file: FeedFile,
        batch_size: usize,
        channel_capacity: usize,
    ) -> Result<Receiver<Result<Vec<R>, ImportError>>, ImportError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let path = self.path(file);
        if !path.exists() {
            return Err(ImportError::FileNotFound(file.file_name().to_string()));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(channel_capacity);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = read_file::<R>(&path, file, batch_size, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
        });

        Ok(rx)
    }
}

fn read_file<R>(
    path: &Path,
    file: FeedFile,
    batch_size: usize,
    tx: &Sender<Result<Vec<R>, ImportError>>,
) -> Result<(), ImportError>
where
    R: DeserializeOwned + Send,
{
    let file_name = file.file_name();

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build()
        .map_err(|err| ImportError::Reader(err.to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| ImportError::Csv {
            file: file_name.to_string(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| ImportError::Csv {
            file: file_name.to_string(),
            source,
        })?
        .clone();

    for batch in reader
        .into_records()
        .batched(BatchPolicy::FixedSize(batch_size))
    {
        let mut raw = Vec::with_capacity(batch.len());
        for result in batch {
            raw.push(result.map_err(|source| ImportError::Csv {
                file: file_name.to_string(),
                source,
            })?);
        }

        // Deserialization is a pure function of the row, so rows within a
        // batch can be transformed in parallel.
        let rows = thread_pool.install(|| {
            raw.par_iter()
                .map(|record| {
                    record
                        .deserialize::<R>(Some(&headers))
                        .map_err(|err| ImportError::Parse {
                            file: file_name.to_string(),
                            line: record.position().map_or(0, |p| p.line()),
                            message: err.to_string(),
                        })
                })
                .collect::<Result<Vec<R>, ImportError>>()
        })?;

        if tx.blocking_send(Ok(rows)).is_err() {
            // Receiver dropped: the import was aborted, stop reading.
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::records::StopRecord;
    use std::io::Write;

    fn feed_with(file_name: &str, contents: &str) -> (tempfile::TempDir, FeedDirectory) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut f = std::fs::File::create(dir.path().join(file_name)).expect("create");
        f.write_all(contents.as_bytes()).expect("write");
        let feed = FeedDirectory::new(dir.path());
        (dir, feed)
    }

    #[tokio::test]
    async fn reads_rows_in_batches_preserving_order() {
        let mut contents = String::from("stop_id,stop_name,stop_lat,stop_lon\n");
        for i in 0..7 {
            contents.push_str(&format!("S{i},Stop {i},1.0,2.0\n"));
        }
        let (_guard, feed) = feed_with("stops.txt", &contents);

        let mut rx = feed
            .read_batches::<StopRecord>(FeedFile::Stops, 3, 2)
            .expect("reader starts");

        let mut sizes = Vec::new();
        let mut ids = Vec::new();
        while let Some(batch) = rx.recv().await {
            let batch = batch.expect("batch parses");
            sizes.push(batch.len());
            ids.extend(batch.into_iter().map(|r| r.stop_id));
        }

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(ids, vec!["S0", "S1", "S2", "S3", "S4", "S5", "S6"]);
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_trimmed() {
        let (_guard, feed) = feed_with(
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\n  S1 , Central ,1.5,2.5\n",
        );

        let mut rx = feed
            .read_batches::<StopRecord>(FeedFile::Stops, 10, 2)
            .expect("reader starts");

        let batch = rx.recv().await.expect("one batch").expect("parses");
        assert_eq!(batch[0].stop_id, "S1");
        assert_eq!(batch[0].stop_name, "Central");
    }

    #[tokio::test]
    async fn missing_file_is_reported_synchronously() {
        let dir = tempfile::tempdir().expect("tempdir");
        let feed = FeedDirectory::new(dir.path());

        let err = feed
            .read_batches::<StopRecord>(FeedFile::Shapes, 10, 2)
            .err()
            .expect("missing file error");

        assert!(matches!(err, ImportError::FileNotFound(name) if name == "shapes.txt"));
    }
}
