//! Remote artifact download
//!
//! ## Module Organization
//!
//! - `progress` - Progress snapshots with guarded fraction computation
//! - `core` - Streaming download to a temp file with atomic rename

mod core;
mod progress;

pub use self::core::{ArtifactDownloader, http_client};
pub use progress::DownloadProgress;
