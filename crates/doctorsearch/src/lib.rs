#![warn(missing_docs)]

//! Concurrent, in-memory n-gram search engine over the physician
//! registry, with hot-swappable index generations and a background
//! updater.
//!
//! The HTTP dispatcher, PDF generation, mailing-list ingress, and the
//! contract domain model are out of scope here; this crate is their
//! search collaborator.

pub mod cert;
pub mod config;
pub mod controller;
pub mod error;
pub mod generation;
pub mod index;
pub mod ngram;
pub mod query;
pub mod record;
pub mod updater;

#[cfg(test)]
mod lifecycle_tests;

pub use config::SearchConfig;
pub use controller::IndexController;
pub use error::{BuildError, ParseError, QueryError, UpdateError};
pub use generation::Generation;
pub use query::DoctorRecord;
pub use record::Record;
pub use updater::{NextMode, Updater};

use tokio_util::sync::CancellationToken;

/// A running search engine: the index controller plus the background
/// updater that feeds it.
pub struct SearchEngine {
	config: SearchConfig,
	controller: IndexController,
	shutdown: CancellationToken,
}

impl SearchEngine {
	/// Starts the controller and its background updater, attempting to
	/// load an initial generation from the configured data file. Fails
	/// only if the updater's pinned certificate authority cannot be
	/// loaded; a missing or unreadable data file just means no
	/// generation is published until the next successful update.
	pub async fn spawn(config: SearchConfig) -> Result<Self, UpdateError> {
		let controller = IndexController::spawn(config.max_concurrent_queries);
		let updater = Updater::new(config.clone(), controller.clone())?;
		let next_mode = updater.init().await;

		let shutdown = CancellationToken::new();
		tokio::spawn(updater.run(next_mode, shutdown.clone()));

		Ok(Self {
			config,
			controller,
			shutdown,
		})
	}

	/// Issues a query against the current index generation, subject to
	/// the configured per-query deadline and to `cancel`, which the
	/// caller can fire to abandon the query early (e.g. because the
	/// originating HTTP request was itself cancelled).
	pub async fn query(
		&self,
		raw_query: &str,
		max_results: usize,
		cancel: CancellationToken,
	) -> Result<Vec<DoctorRecord>, QueryError> {
		query::query(&self.controller, &self.config, raw_query, max_results, cancel).await
	}

	/// Stops the background updater. Already-published generations keep
	/// serving in-flight and future queries.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}
}
