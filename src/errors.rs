use thiserror::Error;

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything recoverable for a single read pair is a [`crate::PairFailure`]
/// value instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Error reading or writing file \"{}\": {source}", file.display())]
    FileIo {
        file: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error writing bucket \"{bucket}\": {source}")]
    BucketIo {
        bucket: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error parsing record {idx} in \"{origin}\": {source}")]
    ParseRecord {
        origin: String,
        idx: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Read {idx} is missing its mate in \"{origin}\"")]
    UnpairedRead { origin: String, idx: usize },
    #[error("Record {idx} in \"{origin}\" has no quality scores")]
    MissingQuality { origin: String, idx: usize },
    #[error("Sequence and quality lengths differ ({seq_len} vs {qual_len}) for \"{name}\"")]
    QualityLength {
        name: String,
        seq_len: usize,
        qual_len: usize,
    },
    #[error("Error parsing \"{string}\" in {context}: {reason}")]
    Parse {
        string: String,
        context: String,
        reason: &'static str,
    },
    #[error("Invalid name \"{string}\" in {context}")]
    InvalidName { string: String, context: String },
    #[error("Duplicate {kind} name \"{name}\" in the id file")]
    DuplicateName { kind: &'static str, name: String },
    #[error("Unknown target \"{target}\" referenced in {context}")]
    UnknownTarget { target: String, context: String },
    #[error("No-forward-primer mode accepts exactly one target, but {count} were given: {names}")]
    NoForwardPrimerWithMultipleTargets { count: usize, names: String },
    #[error("Multiplexing was requested but the id file has no barcodes")]
    NoBarcodes,
    #[error("The id file has no targets")]
    NoTargets,
    #[error("Invalid parameter {param}: {reason}")]
    InvalidParam {
        param: &'static str,
        reason: String,
    },
}

pub fn utf8(b: &[u8]) -> String {
    std::str::from_utf8(b)
        .map(|s| s.to_owned())
        .unwrap_or_else(|_| format!("{:?}", b))
}
