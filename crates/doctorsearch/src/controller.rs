//! The index controller: a single-threaded event loop that owns the
//! `Current`/`Previous` generation slots, admits queries under a
//! concurrency cap, and disposes a retired generation once it is no
//! longer borrowed.
//!
//! State is mutated only inside the event-loop task; everything else
//! talks to it over channels. This avoids a lock shared between the
//! admission path and the publish path.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::generation::Generation;

const CURRENT: usize = 0;
const PREVIOUS: usize = 1;

struct Slot {
	generation: Arc<Generation>,
	in_flight: usize,
}

struct AcquireRequest {
	respond_to: oneshot::Sender<Arc<Generation>>,
}

struct UseIndexRequest {
	generation: Arc<Generation>,
	respond_to: oneshot::Sender<bool>,
}

/// Handle to the running controller. Cloning shares the same
/// underlying event loop.
#[derive(Clone)]
pub struct IndexController {
	acquire_tx: mpsc::UnboundedSender<AcquireRequest>,
	release_tx: mpsc::UnboundedSender<Arc<Generation>>,
	use_index_tx: mpsc::UnboundedSender<UseIndexRequest>,
}

impl IndexController {
	/// Spawns the controller's event loop and returns a handle to it.
	pub fn spawn(max_concurrent_queries: usize) -> Self {
		let (acquire_tx, acquire_rx) = mpsc::unbounded_channel();
		let (release_tx, release_rx) = mpsc::unbounded_channel();
		let (use_index_tx, use_index_rx) = mpsc::unbounded_channel();

		tokio::spawn(
			Loop {
				slots: [None, None],
				max_concurrent_queries,
				acquire_rx,
				release_rx,
				use_index_rx,
			}
			.run(),
		);

		Self {
			acquire_tx,
			release_tx,
			use_index_tx,
		}
	}

	/// Waits for an admitted reference to the current generation. Fails
	/// immediately with [`QueryError::NoIndex`] if no generation has been
	/// published yet, or with [`QueryError::Cancelled`] if `cancel` fires
	/// before a saturated cap frees up.
	pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Arc<Generation>, QueryError> {
		let (respond_to, rx) = oneshot::channel();
		self.acquire_tx
			.send(AcquireRequest { respond_to })
			.map_err(|_| QueryError::NoIndex)?;

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(QueryError::Cancelled),
			result = rx => result.map_err(|_| QueryError::NoIndex),
		}
	}

	/// Releases a previously acquired generation reference. Always
	/// eventually completes; the controller's loop is never blocked on
	/// anything but its own channels.
	pub fn release(&self, generation: Arc<Generation>) {
		let _ = self.release_tx.send(generation);
	}

	/// Publishes a new generation as `Current`. Returns `false`,
	/// rejecting the publish, if `Previous` is still occupied.
	pub async fn use_index(&self, generation: Arc<Generation>) -> bool {
		let (respond_to, rx) = oneshot::channel();
		if self
			.use_index_tx
			.send(UseIndexRequest {
				generation,
				respond_to,
			})
			.is_err()
		{
			return false;
		}
		rx.await.unwrap_or(false)
	}
}

struct Loop {
	slots: [Option<Slot>; 2],
	max_concurrent_queries: usize,
	acquire_rx: mpsc::UnboundedReceiver<AcquireRequest>,
	release_rx: mpsc::UnboundedReceiver<Arc<Generation>>,
	use_index_rx: mpsc::UnboundedReceiver<UseIndexRequest>,
}

impl Loop {
	async fn run(mut self) {
		loop {
			let total_in_flight: usize = self.slots.iter().flatten().map(|s| s.in_flight).sum();
			let current_present = self.slots[CURRENT].is_some();
			let can_admit = current_present && total_in_flight < self.max_concurrent_queries;
			// Keep the acquire arm selectable even when saturated, as long as
			// Current is empty: an empty Current never frees up on its own, so
			// those requests must be drained and rejected immediately instead
			// of left to time out.
			let should_receive_acquire = can_admit || !current_present;

			tokio::select! {
				biased;
				Some(req) = self.acquire_rx.recv(), if should_receive_acquire => {
					self.admit(req);
				}
				Some(generation) = self.release_rx.recv() => {
					self.release(generation);
				}
				Some(req) = self.use_index_rx.recv() => {
					let accepted = self.use_index(req.generation);
					let _ = req.respond_to.send(accepted);
				}
				else => break,
			}
		}
	}

	fn admit(&mut self, req: AcquireRequest) {
		let Some(slot) = self.slots[CURRENT].as_mut() else {
			// No index has been published yet. Drop the request without
			// responding: the caller's oneshot receiver then observes a
			// closed sender and reports `NoIndex` immediately, instead of
			// waiting out its deadline for a slot that will never appear.
			return;
		};
		let generation = Arc::clone(&slot.generation);
		slot.in_flight += 1;
		if req.respond_to.send(Arc::clone(&generation)).is_err() {
			// The caller was cancelled before admission reached it; the
			// slot was never actually borrowed, so release it ourselves.
			self.release(generation);
		}
	}

	fn release(&mut self, generation: Arc<Generation>) {
		for (index, slot) in self.slots.iter_mut().enumerate() {
			let Some(s) = slot else { continue };
			if !Arc::ptr_eq(&s.generation, &generation) {
				continue;
			}
			s.in_flight -= 1;
			if index == PREVIOUS && s.in_flight == 0 {
				self.dispose_previous();
			}
			return;
		}
		tracing::warn!("released a generation the controller does not know about");
	}

	fn use_index(&mut self, generation: Arc<Generation>) -> bool {
		if self.slots[PREVIOUS].is_some() {
			return false;
		}
		let carried_in_flight = self.slots[CURRENT].as_ref().map(|s| s.in_flight).unwrap_or(0);
		self.slots[PREVIOUS] = self.slots[CURRENT].take().map(|s| Slot {
			generation: s.generation,
			in_flight: carried_in_flight,
		});
		self.slots[CURRENT] = Some(Slot {
			generation,
			in_flight: 0,
		});
		tracing::info!("switched active index generation");
		if matches!(&self.slots[PREVIOUS], Some(s) if s.in_flight == 0) {
			self.dispose_previous();
		}
		true
	}

	fn dispose_previous(&mut self) {
		if let Some(slot) = self.slots[PREVIOUS].take() {
			slot.generation.retire();
			tracing::info!("retired previous index generation");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::io::Write;
	use std::time::Duration;

	use super::*;

	async fn test_generation(content: &str) -> Arc<Generation> {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "{content}").unwrap();
		let tokio_file = tokio::fs::File::from_std(file.reopen().unwrap());
		Generation::spawn(tokio_file, HashMap::new())
	}

	#[tokio::test(flavor = "current_thread")]
	async fn acquire_returns_current_generation() {
		let controller = IndexController::spawn(2);
		let generation = test_generation("header\n").await;
		assert!(controller.use_index(Arc::clone(&generation)).await);

		let cancel = CancellationToken::new();
		let acquired = controller.acquire(&cancel).await.unwrap();
		assert!(Arc::ptr_eq(&acquired, &generation));
		controller.release(acquired);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn use_index_rejects_second_retirement_in_flight() {
		let controller = IndexController::spawn(4);
		let gen1 = test_generation("header\n").await;
		let gen2 = test_generation("header\n").await;
		let gen3 = test_generation("header\n").await;
		assert!(controller.use_index(Arc::clone(&gen1)).await);

		let cancel = CancellationToken::new();
		let held = controller.acquire(&cancel).await.unwrap();
		assert!(Arc::ptr_eq(&held, &gen1));

		// gen1 is borrowed, so it will sit in Previous with in_flight=1
		// once gen2 is published; a third publish must be rejected.
		assert!(controller.use_index(Arc::clone(&gen2)).await);
		assert!(!controller.use_index(Arc::clone(&gen3)).await);

		controller.release(held);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn acquire_fails_immediately_when_no_generation_is_published() {
		let controller = IndexController::spawn(4);
		let cancel = CancellationToken::new();

		let result = tokio::time::timeout(Duration::from_millis(50), controller.acquire(&cancel)).await;
		assert!(matches!(result, Ok(Err(QueryError::NoIndex))));
	}

	#[tokio::test(flavor = "current_thread")]
	async fn acquire_respects_concurrency_cap() {
		let controller = IndexController::spawn(1);
		let generation = test_generation("header\n").await;
		assert!(controller.use_index(Arc::clone(&generation)).await);

		let cancel = CancellationToken::new();
		let first = controller.acquire(&cancel).await.unwrap();

		let second_cancel = CancellationToken::new();
		second_cancel.cancel();
		let second = controller.acquire(&second_cancel).await;
		assert!(matches!(second, Err(QueryError::Cancelled)));

		controller.release(first);
	}
}
