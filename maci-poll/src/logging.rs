//! Logging utilities.

use slog::Logger;

/// Extension trait for `slog::Logger`
pub trait LoggerExtensions {
    /// Create a child logger with a `src` key naming the component.
    fn new_with_name(&self, name: &str) -> Self;
}

impl LoggerExtensions for Logger {
    fn new_with_name(&self, name: &str) -> Self {
        self.new(slog::o!("src" => name.to_owned()))
    }
}

/// A logger that drops every record, for tests and reloaded polls.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::info;

    #[test]
    fn child_loggers_can_be_derived_and_used() {
        let logger = discard_logger().new_with_name("poll");
        info!(logger, "child logger works");
    }
}
