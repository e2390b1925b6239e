//! Macros for generating log messages. Each public macro forwards to `__log_event!` with its `tracing` level.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_event {
    ($level:expr, critical, $threshold:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            $crate::log::__tracing::event!(
                $level,
                critical = true,
                threshold = $threshold,
                message = format_args!($($arg)+)
            );
        }
    };
    ($level:expr, plain, $threshold:expr, $($arg:tt)+) => {
        {
            $crate::log::init_logger();
            $crate::log::__tracing::event!(
                $level,
                threshold = $threshold,
                message = format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! critical {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::ERROR, critical, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::ERROR, critical, 0, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::ERROR, plain, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::ERROR, plain, 0, $($arg)+)
    };
}

#[macro_export]
macro_rules! warning {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::WARN, plain, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::WARN, plain, 0, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::INFO, plain, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::INFO, plain, 0, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::DEBUG, plain, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::DEBUG, plain, 0, $($arg)+)
    };
}

#[macro_export]
macro_rules! trace {
    ($threshold:expr, $($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::TRACE, plain, $threshold, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log_event!($crate::log::__tracing::Level::TRACE, plain, 0, $($arg)+)
    };
}


// Makes the macros importable directly from the `log` module.
pub use {critical, error, warning, info, debug, trace};
