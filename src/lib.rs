pub mod calibrate;
pub mod config;
pub mod evidence;
pub mod pipeline;

pub use calibrate::{calibrate, calibrate_profile, CalibrationRequest};
pub use config::PipelineConfig;
pub use evidence::{EvidenceKind, EvidenceStore};
pub use pipeline::{run_pipeline, SeriesBuilder};

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sc_signals=info,sc_vision=info,sc_capture=info".into()),
        )
        .init();
}
