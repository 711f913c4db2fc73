use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV_VAR: &str = "COLAB_GCP_AUTH_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "colab_gcp_auth=debug";

/// Installs a stderr subscriber for the binary.
///
/// `verbose` wins over [`LOG_ENV_VAR`]; without either only warnings are shown.
/// Calling this twice is harmless: the second install is ignored.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_DIRECTIVE)
    } else {
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
