//! Logging abstraction
//!
//! Unified logging macros that work across targets:
//! - `defmt` feature: forwards to `defmt` (RTT transport in the firmware)
//! - Host tests: uses `println!`
//! - Otherwise: compiled out, arguments are still type-checked
//!
//! Only plain `{}` / `{:?}` placeholders are used so the same format string
//! is valid for both `defmt` and `core::fmt`.

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        std::eprintln!("[ERROR] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        std::println!("[WARN] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        std::println!("[INFO] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        std::println!("[DEBUG] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}

/// Log trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        std::println!("[TRACE] {}", format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            if false {
                let _ = ::core::format_args!($($arg)*);
            }
        }
    }};
}
