//! N-gram windowing and query-side Unicode normalization.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::QueryError;

/// Produces every contiguous window of exactly `n` codepoints in `s`,
/// in left-to-right order, advancing one codepoint at a time.
///
/// Strings shorter than `n` codepoints yield no windows.
pub fn ngrams(s: &str, n: usize) -> Vec<String> {
	if n == 0 {
		return Vec::new();
	}
	let chars: Vec<char> = s.chars().collect();
	if chars.len() < n {
		return Vec::new();
	}
	(0..=chars.len() - n)
		.map(|i| chars[i..i + n].iter().collect())
		.collect()
}

/// N-grams of a space-padded, lowercased string, as used both for
/// indexing a record's name fields and for a query token.
pub fn padded_ngrams(word: &str, n: usize) -> Vec<String> {
	let padded = format!(" {} ", word.to_lowercase());
	ngrams(&padded, n)
}

/// Strips accents by round-tripping through decomposed form and
/// dropping nonspacing marks, then recomposes. Query and indexed
/// record text must go through the same transform or recall breaks.
pub fn strip_accents(s: &str) -> String {
	s.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Validates and normalizes a raw query, returning the deduplicated
/// set of n-grams to look up.
pub fn normalize_query(
	raw: &[u8],
	max_query_bytes: usize,
	ngram_size: usize,
) -> Result<HashSet<String>, QueryError> {
	if raw.len() > max_query_bytes {
		return Err(QueryError::TooLong {
			max: max_query_bytes,
		});
	}
	let text = std::str::from_utf8(raw).map_err(|_| QueryError::InvalidUtf8)?;
	let normalized = strip_accents(text);
	if normalized.chars().count() < ngram_size {
		return Err(QueryError::TooShort);
	}

	let mut grams = HashSet::new();
	for token in normalized.split(' ').filter(|t| !t.is_empty()) {
		grams.extend(padded_ngrams(token, ngram_size));
	}
	if grams.is_empty() {
		return Err(QueryError::TooShort);
	}
	Ok(grams)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ngrams_of_ascii_word() {
		assert_eq!(
			ngrams("abcd", 3),
			vec!["abc".to_string(), "bcd".to_string()]
		);
	}

	#[test]
	fn ngrams_shorter_than_n_is_empty() {
		assert!(ngrams("ab", 3).is_empty());
	}

	#[test]
	fn ngrams_count_matches_length_minus_n_plus_one() {
		let s = "héllo wörld";
		let n = 3;
		let count = s.chars().count();
		assert_eq!(ngrams(s, n).len(), count - n + 1);
	}

	#[test]
	fn strip_accents_removes_combining_marks() {
		assert_eq!(strip_accents("DURÉ"), "DURE");
		assert_eq!(strip_accents("Jeân"), "Jean");
	}

	#[test]
	fn normalize_query_rejects_too_long() {
		let raw = vec![b'a'; 300];
		assert!(matches!(
			normalize_query(&raw, 256, 3),
			Err(QueryError::TooLong { .. })
		));
	}

	#[test]
	fn normalize_query_rejects_too_short() {
		assert!(matches!(
			normalize_query(b"ab", 256, 3),
			Err(QueryError::TooShort)
		));
	}

	#[test]
	fn normalize_query_is_idempotent() {
		let grams_once = normalize_query("marie dupont".as_bytes(), 256, 3).unwrap();
		let renormalized = strip_accents("marie dupont");
		let grams_twice = normalize_query(renormalized.as_bytes(), 256, 3).unwrap();
		assert_eq!(grams_once, grams_twice);
	}
}
