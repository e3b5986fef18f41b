//! End-to-end scenarios spanning the controller, a generation's
//! read-service, and query evaluation together.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::controller::IndexController;
use crate::error::QueryError;
use crate::generation::Generation;
use crate::index::build_postings;
use crate::query;

fn record_line(rpps: &str, surname: &str, given_name: &str) -> String {
	let mut fields = vec![String::new(); 53];
	fields[0] = "8".to_string();
	fields[1] = rpps.to_string();
	fields[7] = surname.to_string();
	fields[8] = given_name.to_string();
	fields[9] = "10".to_string();
	fields[17] = "L".to_string();
	fields.join("|")
}

async fn generation_from(source: &str, ngram_size: usize) -> Arc<Generation> {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	write!(file, "{source}").unwrap();
	let output = build_postings(source.as_bytes(), ngram_size).unwrap();
	let tokio_file = tokio::fs::File::from_std(file.reopen().unwrap());
	Generation::spawn(tokio_file, output.postings)
}

/// Under a concurrency cap of 1, a second query that arrives while the
/// first is still holding its generation reference must fail with
/// `Cancelled` once its deadline elapses, rather than wait forever.
#[tokio::test(flavor = "current_thread")]
async fn concurrency_cap_blocks_second_query_until_deadline() {
	let controller = IndexController::spawn(1);
	let source = format!("header\n{}\n", record_line("A1", "DUPONT", "MARIE"));
	let generation = generation_from(&source, 3).await;
	assert!(controller.use_index(generation).await);

	let config = SearchConfig {
		query_deadline: Duration::from_millis(50),
		..SearchConfig::default()
	};

	// Acquire the one admittable slot and hold it open for the whole test.
	let holder_cancel = CancellationToken::new();
	let held = controller.acquire(&holder_cancel).await.unwrap();

	let started = tokio::time::Instant::now();
	let second = query::query(&controller, &config, "marie dupont", 10, CancellationToken::new()).await;
	let elapsed = started.elapsed();

	assert!(matches!(second, Err(QueryError::Cancelled)));
	assert!(elapsed >= Duration::from_millis(50));

	controller.release(held);
}

/// A query cancelled while it holds an admitted generation reference
/// must still release its slot on the way out, so the next caller is
/// not starved by a future that was dropped mid-evaluation.
#[tokio::test(flavor = "current_thread")]
async fn cancelled_query_releases_its_slot_for_the_next_caller() {
	let controller = IndexController::spawn(1);
	let source = format!("header\n{}\n", record_line("A1", "DUPONT", "MARIE"));
	let generation = generation_from(&source, 3).await;
	assert!(controller.use_index(generation).await);

	let cancel = CancellationToken::new();
	cancel.cancel();
	let cancelled = query::query(&controller, &SearchConfig::default(), "marie dupont", 10, cancel).await;
	assert!(matches!(cancelled, Err(QueryError::Cancelled)));

	let next = query::query(
		&controller,
		&SearchConfig::default(),
		"marie dupont",
		10,
		CancellationToken::new(),
	)
	.await
	.unwrap();
	assert_eq!(next.len(), 1);
}

/// Publishing a new generation while the old one is still borrowed
/// moves it to `Previous`; it keeps serving in-flight reads and is
/// only retired once that borrow is released.
#[tokio::test(flavor = "current_thread")]
async fn hot_swap_keeps_previous_generation_alive_for_in_flight_reads() {
	let controller = IndexController::spawn(4);
	let old_source = format!("header\n{}\n", record_line("A1", "DUPONT", "MARIE"));
	let new_source = format!("header\n{}\n", record_line("B2", "DURAND", "LUC"));

	let old_generation = generation_from(&old_source, 3).await;
	assert!(controller.use_index(Arc::clone(&old_generation)).await);

	let cancel = CancellationToken::new();
	let held = controller.acquire(&cancel).await.unwrap();
	assert!(Arc::ptr_eq(&held, &old_generation));

	let new_generation = generation_from(&new_source, 3).await;
	assert!(controller.use_index(new_generation).await);

	// The in-flight query already holds a reference to the old
	// generation; its read-service must still be alive even though the
	// controller has moved it to `Previous`.
	let postings = held.postings_for("mar").expect("old generation still indexed").to_vec();
	let lines = held.read_records(postings, &cancel).await.unwrap();
	assert_eq!(lines.len(), 1);
	assert!(lines[0].contains("A1"));

	controller.release(held);

	// New queries now resolve against the newly published generation.
	let fresh = query::query(
		&controller,
		&SearchConfig::default(),
		"luc durand",
		10,
		CancellationToken::new(),
	)
	.await
	.unwrap();
	assert_eq!(fresh.len(), 1);
	assert_eq!(fresh[0].rpps, "B2");
}
