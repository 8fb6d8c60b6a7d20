//! Logging setup for the generator binary.
//!
//! Generators run before the journal is up, so everything goes to stderr;
//! the service manager captures it.

pub fn setup_logging(level: log::LevelFilter) -> Result<(), String> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ));
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| format!("Error while setting up logger: {e}"))
}
