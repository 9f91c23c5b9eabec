//! Bridge configuration.

/// Settings of one [`Bridge`](crate::Bridge).
///
/// # Example
///
/// ```
/// use proxybind::BridgeConfig;
///
/// let config = BridgeConfig::default().with_abort_on_fatal(false);
/// assert!(!config.abort_on_fatal);
/// assert!(config.report_leaks);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Panic on broken bridge invariants instead of returning
    /// [`BridgeError::Fatal`](proxybind_core::BridgeError::Fatal).
    pub abort_on_fatal: bool,
    /// Log every instance and type still alive at shutdown.
    pub report_leaks: bool,
}

impl BridgeConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether fatal errors panic.
    pub fn with_abort_on_fatal(mut self, abort: bool) -> Self {
        self.abort_on_fatal = abort;
        self
    }

    /// Set whether leaks are logged at shutdown.
    pub fn with_report_leaks(mut self, report: bool) -> Self {
        self.report_leaks = report;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            abort_on_fatal: true,
            report_leaks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_abort_and_report() {
        let config = BridgeConfig::new();
        assert!(config.abort_on_fatal);
        assert!(config.report_leaks);
    }

    #[test]
    fn builders_override() {
        let config = BridgeConfig::new()
            .with_abort_on_fatal(false)
            .with_report_leaks(false);
        assert_eq!(
            config,
            BridgeConfig {
                abort_on_fatal: false,
                report_leaks: false
            }
        );
    }
}
