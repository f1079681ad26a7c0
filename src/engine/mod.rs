//! Engine module housing the playback backends.
//!
//! `backend` defines the [`PlaybackBackend`] seam and its platform
//! implementations. `create_platform_backend` picks the one matching the
//! build target.

pub mod backend;

use std::sync::Arc;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{DesktopStubBackend, PlaybackBackend};

/// Native backend for the current target: Oboe on Android, CPAL elsewhere.
pub fn create_platform_backend() -> Arc<dyn PlaybackBackend> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "android")] {
            Arc::new(OboeBackend::new())
        } else {
            Arc::new(CpalBackend::new())
        }
    }
}
