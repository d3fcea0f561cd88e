/**
 * Downloads Module
 *
 * Chunked HTTP transfer of model artifacts with ledger-backed progress
 * and cooperative cancellation.
 */

mod downloader;
mod error;
mod model_manager;

pub use downloader::*;
pub use error::DownloadError;
pub use model_manager::*;
