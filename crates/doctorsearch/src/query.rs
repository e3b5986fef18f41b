//! Query evaluation: n-gram lookup, ranking, and resolution to records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::controller::IndexController;
use crate::error::QueryError;
use crate::generation::Generation;
use crate::index::Posting;
use crate::ngram::normalize_query;
use crate::record::Record;

/// One physician result, as returned by a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorRecord {
	/// The physician's professional identifier.
	pub rpps: String,
	/// Display name, given name first.
	pub name: String,
	/// Display address, or empty if the registry had no usable street data.
	pub address: String,
}

/// Looks up `raw_query` against the controller's current generation and
/// returns up to `max_results` matches, ranked by descending n-gram hit
/// count. `config.query_deadline` bounds the entire call, from admission
/// through the final record read, not just the admission wait.
pub async fn query(
	controller: &IndexController,
	config: &SearchConfig,
	raw_query: &str,
	max_results: usize,
	cancel: CancellationToken,
) -> Result<Vec<DoctorRecord>, QueryError> {
	let grams = normalize_query(raw_query.as_bytes(), config.max_query_bytes, config.ngram_size)?;

	match tokio::time::timeout(config.query_deadline, run(controller, grams, max_results, &cancel)).await {
		Ok(result) => result,
		Err(_) => Err(QueryError::Cancelled),
	}
}

async fn run(
	controller: &IndexController,
	grams: HashSet<String>,
	max_results: usize,
	cancel: &CancellationToken,
) -> Result<Vec<DoctorRecord>, QueryError> {
	let generation = controller.acquire(cancel).await?;
	let admission = Admission::new(controller, generation);
	evaluate(admission.generation(), grams, max_results, cancel).await
}

/// Guarantees an acquired generation reference is released exactly once,
/// even if this future is dropped mid-evaluation — e.g. when the
/// surrounding deadline in [`query`] elapses while resolving postings.
struct Admission<'a> {
	controller: &'a IndexController,
	generation: Arc<Generation>,
}

impl<'a> Admission<'a> {
	fn new(controller: &'a IndexController, generation: Arc<Generation>) -> Self {
		Self { controller, generation }
	}

	fn generation(&self) -> &Generation {
		&self.generation
	}
}

impl Drop for Admission<'_> {
	fn drop(&mut self) {
		self.controller.release(Arc::clone(&self.generation));
	}
}

async fn evaluate(
	generation: &Generation,
	grams: HashSet<String>,
	max_results: usize,
	cancel: &CancellationToken,
) -> Result<Vec<DoctorRecord>, QueryError> {
	let mut hits: HashMap<u64, (Posting, usize)> = HashMap::new();
	for gram in &grams {
		let Some(postings) = generation.postings_for(gram) else {
			continue;
		};
		for posting in postings {
			let entry = hits.entry(posting.start_offset).or_insert((*posting, 0));
			entry.1 += 1;
		}
	}

	let mut ranked: Vec<(Posting, usize)> = hits.into_values().collect();
	ranked.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

	if cancel.is_cancelled() {
		return Err(QueryError::Cancelled);
	}
	ranked.truncate(max_results);

	let postings: Vec<Posting> = ranked.into_iter().map(|(posting, _)| posting).collect();
	let lines = generation.read_records(postings, cancel).await?;

	lines
		.into_iter()
		.map(|line| {
			let record = Record::parse(&line)?;
			Ok(DoctorRecord {
				rpps: record.rpps().to_string(),
				name: record.full_name(),
				address: record.address(),
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;
	use crate::controller::IndexController;
	use crate::index::build_postings;

	fn line(rpps: &str, surname: &str, given_name: &str) -> String {
		let mut fields = vec![String::new(); 53];
		fields[0] = "8".to_string();
		fields[1] = rpps.to_string();
		fields[7] = surname.to_string();
		fields[8] = given_name.to_string();
		fields[9] = "10".to_string();
		fields[17] = "L".to_string();
		fields.join("|")
	}

	async fn published_generation(controller: &IndexController, source: &str, ngram_size: usize) {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "{source}").unwrap();
		let output = build_postings(source.as_bytes(), ngram_size).unwrap();
        let tokio_file = tokio::fs::File::from_std(file.reopen().unwrap());
		let generation = crate::generation::Generation::spawn(tokio_file, output.postings);
		assert!(controller.use_index(generation).await);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn single_record_exact_match() {
		let controller = IndexController::spawn(4);
		let source = format!("header\n{}\n", line("A1", "DUPONT", "MARIE"));
		published_generation(&controller, &source, 3).await;

		let config = SearchConfig::default();
		let results = query(&controller, &config, "marie dupont", 10, CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].rpps, "A1");
		assert_eq!(results[0].name, "Marie Dupont");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn accent_insensitive_recall() {
		let controller = IndexController::spawn(4);
		let source = format!("header\n{}\n", line("A1", "DURÉ", "JEÂN"));
		published_generation(&controller, &source, 3).await;

		let config = SearchConfig::default();
		let results = query(&controller, &config, "dure jean", 10, CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].rpps, "A1");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn ranking_prefers_more_distinct_ngram_hits() {
		let controller = IndexController::spawn(4);
		let source = format!(
			"header\n{}\n{}\n{}\n",
			line("A1", "MARTIN", "X"),
			line("A2", "MARTEL", "X"),
			line("A3", "MARCHAL", "X"),
		);
		published_generation(&controller, &source, 3).await;

		let config = SearchConfig::default();
		let results = query(&controller, &config, "martin", 10, CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(results[0].rpps, "A1");
	}

	#[tokio::test(flavor = "current_thread")]
	async fn header_only_index_returns_no_results() {
		let controller = IndexController::spawn(4);
		published_generation(&controller, "header\n", 3).await;

		let config = SearchConfig::default();
		let results = query(&controller, &config, "anything", 10, CancellationToken::new())
			.await
			.unwrap();
		assert!(results.is_empty());
	}
}
