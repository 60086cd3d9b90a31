use {
    flexi_logger::{DeferredNow, Logger, Record},
    std::{fmt::Write as FmtWrite, sync::Once},
    textwrap::{termwidth, Options},
};

static INIT: Once = Once::new();

/// Install a logger which wraps long messages to the terminal width.
///
/// Every test calls this, only the first call has any effect.
pub fn setup_logger() {
    INIT.call_once(|| {
        let handle = Logger::try_with_env_or_str("trace")
            .and_then(|logger| logger.format(multiline_format).start());
        match handle {
            // Dropping the handle would stop the logger.
            Ok(handle) => std::mem::forget(handle),
            Err(err) => eprintln!("Unable to start the test logger: {}", err),
        }
    });
}

fn multiline_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    let size = termwidth().min(80);
    let wrap_options = Options::new(size)
        .initial_indent("┏ ")
        .subsequent_indent("┃ ");

    let mut full_line = String::new();
    let _ = writeln!(
        full_line,
        "{} [{}:{}]",
        record.level(),
        record.file().unwrap_or("<unnamed>"),
        record.line().unwrap_or(0),
    );
    let _ = write!(full_line, "{}", record.args());

    write!(w, "{}", textwrap::fill(&full_line, wrap_options))
}
