//! Background index updater: periodically downloads a fresh registry
//! archive, builds a new generation, and publishes it through the
//! controller.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cert::build_http_client;
use crate::config::SearchConfig;
use crate::controller::IndexController;
use crate::error::{BuildError, UpdateError};
use crate::index::PostingsMap;

const REGISTRY_URL: &str =
	"https://service.annuaire.sante.fr/annuaire-sante-webservices/V300/services/extraction/PS_LibreAcces";
const ARCHIVE_MEMBER_PREFIX: &str = "PS_LibreAcces_Personne_activite_";

/// Which cadence the updater should use for its next sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMode {
	/// The previous update succeeded; wait the full period.
	Normal,
	/// The previous update failed; retry sooner.
	Fast,
}

/// Drives periodic refresh of the index from the remote registry source.
pub struct Updater {
	config: SearchConfig,
	controller: IndexController,
	client: reqwest::Client,
}

impl Updater {
	/// Builds an updater bound to `controller`. Fails only if the pinned
	/// certificate authority cannot be loaded.
	pub fn new(config: SearchConfig, controller: IndexController) -> Result<Self, UpdateError> {
		Ok(Self {
			config,
			controller,
			client: build_http_client()?,
		})
	}

	/// Builds an index from the canonical on-disk registry file, if
	/// present, and publishes it. Returns the cadence to use for the
	/// first scheduled update.
	pub async fn init(&self) -> NextMode {
		match build_and_publish_from_path(&self.controller, &self.config.data_file_path, self.config.ngram_size).await
		{
			Ok(()) => NextMode::Normal,
			Err(error) => {
				tracing::warn!(%error, "no usable index at startup");
				NextMode::Fast
			}
		}
	}

	/// Runs the update loop until `shutdown` fires. A no-op if
	/// `update_period` is zero.
	pub async fn run(self, mut next_mode: NextMode, shutdown: CancellationToken) {
		if self.config.update_period.is_zero() {
			return;
		}

		loop {
			let delay = next_update_delay(next_mode, &self.config);
			tracing::trace!(?delay, "scheduled next registry update");
			tokio::select! {
				_ = shutdown.cancelled() => return,
				_ = tokio::time::sleep(delay) => {}
			}

			next_mode = match self.run_once().await {
				Ok(()) => NextMode::Normal,
				Err(error) => {
					tracing::error!(%error, "registry update failed");
					NextMode::Fast
				}
			};
		}
	}

	async fn run_once(&self) -> Result<(), UpdateError> {
		let response = self.client.get(REGISTRY_URL).send().await?.error_for_status()?;
		let bytes = response.bytes().await?;

		let temp_dir = tempfile::tempdir()?;
		let zip_path = temp_dir.path().join("registry.zip");
		tokio::fs::write(&zip_path, &bytes).await?;

		let data_path = temp_dir.path().join("registry.txt");
		let ngram_size = self.config.ngram_size;
		{
			let zip_path = zip_path.clone();
			let data_path = data_path.clone();
			tokio::task::spawn_blocking(move || extract_member(&zip_path, &data_path))
				.await
				.expect("extraction task panicked")?;
		}
		let postings = build_from_path(&data_path, ngram_size).await?;

		let file = tokio::fs::File::open(&data_path).await?;
		let generation = crate::generation::Generation::spawn(file, postings);
		if self.controller.use_index(generation).await
			&& let Err(error) = std::fs::rename(&data_path, &self.config.data_file_path)
		{
			tracing::error!(%error, "failed to overwrite canonical registry file");
		}
		Ok(())
	}
}

/// Computes the delay before the next update attempt, applying
/// symmetric jitter around the configured period for `mode`.
fn next_update_delay(mode: NextMode, config: &SearchConfig) -> Duration {
	let base = match mode {
		NextMode::Normal => config.update_period,
		NextMode::Fast => config.update_min_period,
	};
	let jitter_factor = config.update_period_jitter as f64 * (2.0 * rand::random::<f64>() - 1.0);
	let scaled = (base.as_secs_f64() * (1.0 + jitter_factor)).max(0.0);
	Duration::from_secs_f64(scaled)
}

/// Extracts the first ZIP member whose name starts with the expected
/// prefix into `data_path`. Runs synchronously; callers should run this
/// on a blocking thread.
fn extract_member(zip_path: &Path, data_path: &Path) -> Result<(), UpdateError> {
	let file = std::fs::File::open(zip_path)?;
	let mut archive = zip::ZipArchive::new(file)?;
	let member_index = (0..archive.len())
		.find(|&i| {
			archive
				.by_index(i)
				.map(|f| f.name().starts_with(ARCHIVE_MEMBER_PREFIX))
				.unwrap_or(false)
		})
		.ok_or(UpdateError::MissingArchiveMember)?;

	let mut member = archive.by_index(member_index)?;
	let mut out = std::fs::File::create(data_path)?;
	std::io::copy(&mut member, &mut out)?;
	Ok(())
}

async fn build_from_path(path: &Path, ngram_size: usize) -> Result<PostingsMap, BuildError> {
	let path = path.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let file = std::fs::File::open(&path)?;
		crate::index::build_postings(file, ngram_size).map(|output| output.postings)
	})
	.await
	.expect("build task panicked")
}

async fn build_and_publish_from_path(
	controller: &IndexController,
	path: &Path,
	ngram_size: usize,
) -> Result<(), UpdateError> {
	let postings = build_from_path(path, ngram_size).await?;
	let file = tokio::fs::File::open(path).await?;
	let generation = crate::generation::Generation::spawn(file, postings);
	controller.use_index(generation).await;
	Ok(())
}
