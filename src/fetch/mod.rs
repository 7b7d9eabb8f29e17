//! アーカイブ取得モジュール

mod archive;
mod sink;

pub use archive::{
    is_binary_stream, ArchiveFetcher, FetchOutcome, FetchTarget, ARCHIVE_EXTENSION, BINARY_STREAM,
    MAX_REDIRECTS,
};
pub use sink::{LocalDirSink, ObjectStoreSink};
