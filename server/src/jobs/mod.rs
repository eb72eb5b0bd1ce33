pub(crate) mod metadata;
pub(crate) mod queue;
pub(crate) mod thumbnail;
pub(crate) mod worker;

/// Failures raised while processing a single queued plate. Workers log
/// these and move on; one bad item never stops the loop.
#[derive(Debug)]
pub(crate) enum PlateProcessError {
    InvalidImageData(String),
    UnsupportedFormat(String),
    RecordNotFound,
    ConcurrencyConflict,
    SourceMissing(String),
    StorageWrite(String),
    Worker(String),
}
