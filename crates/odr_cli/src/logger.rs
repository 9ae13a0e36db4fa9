//! Log output of the binaries: `level: message` lines on stderr.

use log::LevelFilter;

/// The level selected by the `--quiet` and `--verbose` flags.
pub fn level(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// A dispatcher writing records at or above `level` to stderr.
pub fn stderr(level: LevelFilter) -> fern::Dispatch {
    fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}: {}",
                record.level().as_str().to_lowercase(),
                message
            ))
        })
        .chain(std::io::stderr())
}

/// Installs the stderr logger. Fails if a logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    stderr(level).apply()
}
