//! An index generation: an immutable postings map paired with the
//! read-service that resolves postings back to full lines.
//!
//! Each generation owns its registry file handle exclusively. Reads are
//! serialized through a single worker task so that concurrent queries
//! never interleave seeks on the same file descriptor.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{QueryError, ReadWorkerError};
use crate::index::{Posting, PostingsMap};

/// Grace period between a generation's retirement and its read-service
/// worker shutting down. Queries admitted before retirement are
/// expected to finish comfortably inside this window.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

struct ReadBatch {
	postings: Vec<Posting>,
	result_tx: mpsc::Sender<String>,
	error_tx: oneshot::Sender<ReadWorkerError>,
}

/// One published index generation.
pub struct Generation {
	postings: PostingsMap,
	batch_tx: mpsc::UnboundedSender<ReadBatch>,
	shutdown: Arc<Notify>,
}

impl Generation {
	/// Builds a generation from a postings map and an open file handle.
	/// Spawns the read-service worker that will own the handle for the
	/// rest of the generation's life.
	pub fn spawn(file: tokio::fs::File, postings: PostingsMap) -> Arc<Self> {
		let (batch_tx, batch_rx) = mpsc::unbounded_channel();
		let shutdown = Arc::new(Notify::new());
		tokio::spawn(read_service(file, batch_rx, Arc::clone(&shutdown)));
		Arc::new(Self {
			postings,
			batch_tx,
			shutdown,
		})
	}

	/// Postings for a single n-gram, if any record matches it.
	pub fn postings_for(&self, ngram: &str) -> Option<&[Posting]> {
		self.postings.get(ngram).map(Vec::as_slice)
	}

	/// Resolves a batch of postings to their raw record lines, in the
	/// order submitted. Stops and returns the first error encountered;
	/// honors cancellation while waiting.
	pub async fn read_records(
		&self,
		postings: Vec<Posting>,
		cancel: &CancellationToken,
	) -> Result<Vec<String>, QueryError> {
		if postings.is_empty() {
			return Ok(Vec::new());
		}
		let expected = postings.len();
		let (result_tx, mut result_rx) = mpsc::channel(expected);
		let (error_tx, mut error_rx) = oneshot::channel();

		if self
			.batch_tx
			.send(ReadBatch {
				postings,
				result_tx,
				error_tx,
			})
			.is_err()
		{
			return Err(QueryError::Read(ReadWorkerError::Io(
				"read-service worker is no longer running".to_string(),
			)));
		}

		let mut lines = Vec::with_capacity(expected);
		while lines.len() < expected {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(QueryError::Cancelled),
				maybe_line = result_rx.recv() => {
					match maybe_line {
						Some(line) => lines.push(line),
						None => break,
					}
				}
			}
		}

		if lines.len() < expected
			&& let Ok(err) = error_rx.try_recv()
		{
			return Err(err.into());
		}
		Ok(lines)
	}

	/// Retires this generation: after the teardown grace period, signals
	/// the read-service worker to stop and close the file.
	pub fn retire(self: &Arc<Self>) {
		let shutdown = Arc::clone(&self.shutdown);
		tokio::spawn(async move {
			tokio::time::sleep(TEARDOWN_GRACE).await;
			shutdown.notify_one();
		});
	}
}

async fn read_service(
	mut file: tokio::fs::File,
	mut batch_rx: mpsc::UnboundedReceiver<ReadBatch>,
	shutdown: Arc<Notify>,
) {
	let mut buf: Vec<u8> = Vec::new();
	loop {
		tokio::select! {
			biased;
			_ = shutdown.notified() => return,
			batch = batch_rx.recv() => {
				let Some(batch) = batch else { return };
				if process_batch(&mut file, &mut buf, batch).await.is_err() {
					// The batch's error channel already carries the failure;
					// keep serving later batches.
				}
			}
		}
	}
}

async fn process_batch(
	file: &mut tokio::fs::File,
	buf: &mut Vec<u8>,
	batch: ReadBatch,
) -> Result<(), ()> {
	for posting in batch.postings {
		match read_one(file, buf, posting).await {
			Ok(line) => {
				if batch.result_tx.send(line).await.is_err() {
					return Ok(());
				}
			}
			Err(err) => {
				let _ = batch.error_tx.send(err);
				return Err(());
			}
		}
	}
	Ok(())
}

async fn read_one(
	file: &mut tokio::fs::File,
	buf: &mut Vec<u8>,
	posting: Posting,
) -> Result<String, ReadWorkerError> {
	file.seek(SeekFrom::Start(posting.start_offset)).await?;
	let len = posting.length as usize;
	if buf.len() < len {
		buf.resize(len, 0);
	}
	let slice = &mut buf[..len];
	file.read_exact(slice).await?;
	std::str::from_utf8(slice)
		.map(str::to_string)
		.map_err(|_| ReadWorkerError::InvalidUtf8)
}
