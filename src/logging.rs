//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive applied on top of `RUST_LOG`
pub const DEFAULT_DIRECTIVE: &str = "stable_loop_monitor=info";

/// `RUST_LOG` plus the crate default; `verbose` raises the crate to debug.
pub fn init(verbose: bool) -> eyre::Result<()> {
    let directive = if verbose {
        "stable_loop_monitor=debug"
    } else {
        DEFAULT_DIRECTIVE
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .try_init()?;

    Ok(())
}
