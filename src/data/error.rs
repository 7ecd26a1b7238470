use thiserror::Error;

/// Errors surfaced by the sample and batch pipeline.
///
/// No retries happen internally; the data-loading harness decides whether
/// to skip, retry, or abort on a failed sample.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Source image could not be decoded or has a zero dimension.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    /// A box field in an annotation line did not parse.
    #[error("malformed annotation {field:?}: {reason}")]
    AnnotationParse { field: String, reason: String },

    /// Every sample in a collation call lacked annotations.
    #[error("empty batch: no sample carried annotations")]
    EmptyBatch,
}
