use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use once_cell::sync::OnceCell;

/// Initializes the logging system.
///
/// This function sets up the logger based on a configuration file.
/// It should be called once at the beginning of the application's execution.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file("log4rs.yaml", Default::default())?;
    Ok(())
}

static CONSOLE_INIT: OnceCell<()> = OnceCell::new();

/// Programmatic console fallback for tests and embedders without a
/// `log4rs.yaml`. Safe to call more than once.
pub fn init_console(level: LevelFilter) {
    CONSOLE_INIT.get_or_init(|| {
        let stdout = ConsoleAppender::builder().build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(level));
        if let Ok(c) = config {
            let _ = log4rs::init_config(c);
        }
    });
}
