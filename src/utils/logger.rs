use chrono::Local;
use eyre::Result;
use fern::Dispatch;
use log::LevelFilter;

/// Sets up the application logger on stderr, leaving stdout to command output.
///
/// The level comes from `RUST_LOG` and defaults to `Info`.
///
/// # Errors
/// * If a logger is already installed
pub fn setup_logger() -> Result<()> {
    Dispatch::new()
        .level(level_from(std::env::var("RUST_LOG").ok().as_deref()))
        // Chatty dependencies stay at warn unless asked for
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stderr())
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ));
        })
        .apply()?;
    Ok(())
}

/// Parses a `RUST_LOG`-style level, `Info` when unset or unknown.
fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|level| level.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from() {
        for (value, expected) in &[
            (None, LevelFilter::Info),
            (Some("debug"), LevelFilter::Debug),
            (Some(" WARN "), LevelFilter::Warn),
            (Some("verbose"), LevelFilter::Info),
        ] {
            assert_eq!(level_from(*value), *expected);
        }
    }
}
