use env_logger::Env;
use log::LevelFilter;
use once_cell::sync::OnceCell;

static INSTALLED_LEVEL: OnceCell<LevelFilter> = OnceCell::new();

fn env_level() -> LevelFilter {
    std::env::var("IMU_CAPTURE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| parse_level(Some(v)))
        .unwrap_or(LevelFilter::Info)
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Parse a level name such as `"debug"`; unknown names yield `None`.
pub fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.trim().parse::<LevelFilter>().ok())
}

/// Initialize the stderr logger based on `IMU_CAPTURE_LOG`/`RUST_LOG`.
///
/// Only binaries call this; library code writes through the `log` facade.
/// Safe to call multiple times, the logger is installed on first call.
pub fn init_logging() {
    INSTALLED_LEVEL.get_or_init(|| {
        let level = env_level();
        let env = Env::default().default_filter_or(level_to_str(level));
        let installed = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(true)
            .try_init();
        if installed.is_err() {
            // Another logger won the race (e.g. a test harness); keep its level.
            return log::max_level();
        }
        level
    });
}

/// Level chosen by `init_logging`, or `None` if it has not run.
pub fn installed_level() -> Option<LevelFilter> {
    INSTALLED_LEVEL.get().copied()
}
