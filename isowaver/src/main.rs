use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use isowaver::{Isowaver, IsowaverError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Log to STDERR, and to `log_file` too if given. The returned guard flushes the file
/// when dropped.
fn configure_log(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .with(
            fmt::layer()
                .compact()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(io::stderr),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
    tracing_log::LogTracer::init().map_err(io::Error::other)?;
    Ok(guard)
}

fn main() -> Result<(), IsowaverError> {
    let args = Isowaver::parse_configured()?;

    let _guard = configure_log(args.log_file.as_deref())?;
    args.main()?;
    Ok(())
}
