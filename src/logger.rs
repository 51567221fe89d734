use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Map `-v` occurrences to a default log level
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the global logger. `RUST_LOG` takes precedence over `verbosity`.
pub fn init(verbosity: u8) {
    let default = level_for(verbosity).to_string().to_lowercase();

    Builder::from_env(Env::default().default_filter_or(default))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Trace);
    }
}
