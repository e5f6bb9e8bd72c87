pub mod config;
pub mod models;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::extraction::{DocumentTable, ExtractionOrchestrator, LoanDocument};
pub use pipeline::processor::{LoanDocumentProcessor, ProcessingError, ProcessingOutput};
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `config::default_log_filter()`. Does nothing if a global subscriber is
/// already set.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
