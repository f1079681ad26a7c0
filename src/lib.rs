// Hello Oboe Core - low-latency tone playback with a self-managed call demo
// One serialized coordinator owns the audio session, latency poller and call connection

// Module declarations
pub mod audio;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod latency;
pub mod telemetry;
pub mod telephony;

// Re-exports for convenience
pub use audio::{AudioEngineSession, StreamConfig};
pub use config::AppConfig;
pub use coordinator::{
    BroadcastPresenter, Coordinator, CoordinatorHandle, CoordinatorParts, CoordinatorSnapshot,
    LifecycleSignal, Presenter, UiCommand, UiEvent,
};
pub use engine::{create_platform_backend, PlaybackBackend};
pub use error::{AudioError, CallError, ErrorCode, RejectionReason};

#[cfg(target_os = "android")]
use log::info;

const LOG_TAG: &str = "HelloOboe";

/// Install the global tracing subscriber. `log` records are bridged into it.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "android")] {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            match tracing_android::layer(LOG_TAG) {
                Ok(layer) => {
                    let _ = tracing_subscriber::registry().with(layer).try_init();
                }
                Err(err) => eprintln!("{}: logcat layer unavailable: {}", LOG_TAG, err),
            }
        } else {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    tracing::info!(tag = LOG_TAG, "Logging initialized");
}

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: jni::JavaVM, _reserved: *mut std::ffi::c_void) -> jni::sys::jint {
    init_logging();

    info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the runtime hands us a live JavaVM pointer, and this runs
    // before any Oboe stream is opened. No Activity is available here, so
    // the context object stays null.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer().cast(),
            std::ptr::null_mut(),
        );
    }

    info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}
