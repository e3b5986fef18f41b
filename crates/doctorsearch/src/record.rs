//! Parsing and normalization of a single registry line.

use crate::error::ParseError;
use crate::ngram::padded_ngrams;

const FIELD_COUNT: usize = 53;

const FIELD_ID_TYPE: usize = 0;
const FIELD_RPPS: usize = 1;
const FIELD_SURNAME: usize = 7;
const FIELD_GIVEN_NAME: usize = 8;
const FIELD_PROFESSION_CODE: usize = 9;
const FIELD_EXERCISE_MODE: usize = 17;
const FIELD_STREET_NUMBER: usize = 28;
const FIELD_STREET_NUMBER_SUFFIX: usize = 29;
const FIELD_WAY_TYPE: usize = 31;
const FIELD_WAY_NAME: usize = 32;
const FIELD_POSTAL_CODE: usize = 35;
const FIELD_MUNICIPALITY: usize = 37;

const INDEXABLE_ID_TYPE: u8 = 8;
const INDEXABLE_PROFESSION_CODE: &str = "10";
const INDEXABLE_EXERCISE_MODE: &str = "L";

/// A single physician entry, parsed from one pipe-delimited registry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
	id_type: u8,
	rpps: String,
	surname: String,
	given_name: String,
	profession_code: String,
	exercise_mode: String,
	street_number: String,
	street_number_suffix: String,
	way_type: String,
	way_name: String,
	postal_code: String,
	municipality: String,
}

impl Record {
	/// Parses one registry line. The line must not include its line
	/// terminator.
	pub fn parse(line: &str) -> Result<Self, ParseError> {
		let fields: Vec<&str> = line.split('|').collect();
		if fields.len() != FIELD_COUNT {
			return Err(ParseError::FieldCount(fields.len()));
		}
		let id_type = fields[FIELD_ID_TYPE]
			.parse::<u8>()
			.map_err(ParseError::IdType)?;

		Ok(Self {
			id_type,
			rpps: fields[FIELD_RPPS].to_string(),
			surname: fields[FIELD_SURNAME].to_string(),
			given_name: fields[FIELD_GIVEN_NAME].to_string(),
			profession_code: fields[FIELD_PROFESSION_CODE].to_string(),
			exercise_mode: fields[FIELD_EXERCISE_MODE].to_string(),
			street_number: fields[FIELD_STREET_NUMBER].to_string(),
			street_number_suffix: fields[FIELD_STREET_NUMBER_SUFFIX].to_string(),
			way_type: fields[FIELD_WAY_TYPE].to_string(),
			way_name: fields[FIELD_WAY_NAME].to_string(),
			postal_code: fields[FIELD_POSTAL_CODE].to_string(),
			municipality: fields[FIELD_MUNICIPALITY].to_string(),
		})
	}

	/// Whether this record belongs in the index: an independent-practice
	/// physician.
	pub fn is_indexable(&self) -> bool {
		self.id_type == INDEXABLE_ID_TYPE
			&& self.profession_code == INDEXABLE_PROFESSION_CODE
			&& self.exercise_mode == INDEXABLE_EXERCISE_MODE
	}

	/// The professional identifier, verbatim.
	pub fn rpps(&self) -> &str {
		&self.rpps
	}

	/// Display name, given name first.
	pub fn full_name(&self) -> String {
		format!("{} {}", titlecase(&self.given_name), titlecase(&self.surname))
	}

	/// Display address, or empty if the source has no usable street data.
	pub fn address(&self) -> String {
		if self.way_name.trim().is_empty()
			|| self.postal_code.trim().is_empty()
			|| self.municipality.trim().is_empty()
		{
			return String::new();
		}

		let mut out = String::new();
		let number = self.street_number.trim();
		let suffix = self.street_number_suffix.trim();
		if !number.is_empty() || !suffix.is_empty() {
			out.push_str(number);
			out.push_str(&suffix.to_lowercase());
			out.push(' ');
		}
		let way_type = self.way_type.trim();
		if !way_type.is_empty() {
			out.push_str(&way_type.to_lowercase());
			out.push(' ');
		}
		out.push_str(&format!(
			"{}, {} {}",
			titlecase(self.way_name.trim()),
			self.postal_code.trim(),
			self.municipality.trim().to_uppercase(),
		));
		out
	}

	/// N-grams of this record's name fields, given-name first.
	pub fn ngrams(&self, n: usize) -> Vec<String> {
		let mut grams = padded_ngrams(&self.given_name, n);
		grams.extend(padded_ngrams(&self.surname, n));
		grams
	}
}

/// Lowercases `s`, then capitalizes the first codepoint of each
/// whitespace-separated word.
fn titlecase(s: &str) -> String {
	s.to_lowercase()
		.split(' ')
		.map(|word| {
			let mut chars = word.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}
