//! Error types for the registry search engine.

use thiserror::Error;

/// A line in the registry file did not parse as a physician record.
#[derive(Debug, Error)]
pub enum ParseError {
	/// The line did not split into exactly 53 pipe-delimited fields.
	#[error("expected 53 fields, found {0}")]
	FieldCount(usize),

	/// Field 0 was not a valid `u8`.
	#[error("field 0 is not a valid identifier-type byte: {0}")]
	IdType(#[source] std::num::ParseIntError),

	/// A name field was empty or otherwise unusable.
	#[error("record contains non-UTF-8 name data")]
	InvalidName,
}

/// Errors surfaced to a caller issuing a query.
///
/// Variants map to the error taxonomy: invalid input, temporary
/// unavailability, cancellation, and internal failure.
#[derive(Debug, Error)]
pub enum QueryError {
	/// The raw query exceeded the configured byte limit.
	#[error("query exceeds the maximum of {max} bytes")]
	TooLong {
		/// The configured maximum, in bytes.
		max: usize,
	},

	/// The raw query was not valid UTF-8.
	#[error("query is not valid UTF-8")]
	InvalidUtf8,

	/// The normalized query has fewer codepoints than the index's n-gram size.
	#[error("query is shorter than the index n-gram size after normalization")]
	TooShort,

	/// No index generation has been published yet.
	#[error("no index is currently available")]
	NoIndex,

	/// The query was cancelled, or its deadline elapsed, before it completed.
	#[error("query was cancelled or exceeded its deadline")]
	Cancelled,

	/// The read-service failed to resolve a matched posting.
	#[error("internal error resolving query results: {0}")]
	Read(#[from] ReadWorkerError),

	/// A record resolved from a matched posting failed to parse.
	#[error("internal error: record at a matched posting failed to parse: {0}")]
	Record(#[from] ParseError),
}

/// Errors from a generation's read-service worker.
#[derive(Debug, Error, Clone)]
pub enum ReadWorkerError {
	/// Seeking or reading the registry file failed.
	#[error("I/O error seeking or reading the registry file: {0}")]
	Io(String),

	/// The bytes at a posting's offset were not valid UTF-8.
	#[error("posting did not point at valid UTF-8")]
	InvalidUtf8,
}

impl From<std::io::Error> for ReadWorkerError {
	fn from(error: std::io::Error) -> Self {
		Self::Io(error.to_string())
	}
}

/// Errors from building a new index generation.
#[derive(Debug, Error)]
pub enum BuildError {
	/// An I/O error occurred reading the registry file.
	#[error("I/O error reading the registry file: {0}")]
	Io(#[from] std::io::Error),

	/// A line failed to parse; the build is aborted.
	#[error("registry file is malformed at byte offset {offset}: {source}")]
	Malformed {
		/// Byte offset of the line that failed to parse.
		offset: u64,
		/// The underlying parse failure.
		source: ParseError,
	},
}

/// Errors from one iteration of the background updater.
#[derive(Debug, Error)]
pub enum UpdateError {
	/// The registry archive failed to download.
	#[error("download failed: {0}")]
	Download(#[from] reqwest::Error),

	/// The downloaded archive had no member matching the expected prefix.
	#[error("download produced no usable archive member")]
	MissingArchiveMember,

	/// The downloaded archive could not be read as a ZIP file.
	#[error("archive error: {0}")]
	Archive(#[from] zip::result::ZipError),

	/// An I/O error occurred while downloading, extracting, or publishing.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Building the index from the downloaded data failed.
	#[error("failed to build index from downloaded data: {0}")]
	Build(#[from] BuildError),

	/// The pinned certificate authority could not be loaded.
	#[error("failed to load the pinned certificate authority: {0}")]
	Certificate(#[source] reqwest::Error),
}
