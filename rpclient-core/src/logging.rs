//! Diagnostic logging of the client itself.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. Calling this more than once, or after
/// the host application installed its own subscriber, is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod test {
    #[test]
    fn init_is_idempotent() {
        super::init("debug");
        super::init("not a [valid filter");
    }
}
