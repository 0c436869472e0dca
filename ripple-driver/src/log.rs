/// init log framework.
///
/// The level defaults to `info` and can be overridden with `RIPPLE_LOG`.
#[cfg(feature = "logs")]
pub fn init() {
    use std::sync::atomic::{AtomicBool, Ordering};
    static LOG_INITED: AtomicBool = AtomicBool::new(false);
    if LOG_INITED
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
    {
        let level = std::env::var("RIPPLE_LOG")
            .ok()
            .and_then(|level| level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info);
        let mut builder = simplelog::ConfigBuilder::new();
        let result = builder.set_time_format_rfc2822().set_time_offset_to_local();
        let config = match result {
            Ok(builder) | Err(builder) => builder,
        }
        .build();
        _ = simplelog::CombinedLogger::init(vec![simplelog::TermLogger::new(
            level,
            config,
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )]);
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "logs")] {
                $crate::log::init();
                log::debug!($($arg)+)
            }
        }
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "logs")] {
                $crate::log::init();
                log::info!($($arg)+)
            }
        }
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "logs")] {
                $crate::log::init();
                log::warn!($($arg)+)
            }
        }
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "logs")] {
                $crate::log::init();
                log::error!($($arg)+)
            }
        }
    };
}
