use thiserror::Error;

/// Errors that can occur when working with BLE fitness hardware
#[derive(Error, Debug)]
pub enum TrainerError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No Bluetooth adapter is available on this host
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    /// The Bluetooth radio is present but powered off or inaccessible
    #[error("Bluetooth radio is disabled")]
    AdapterDisabled,

    /// The requested device was not found
    #[error("Trainer device not found: {0}")]
    DeviceNotFound(String),

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// A required GATT service or characteristic is missing on the device
    #[error("Characteristic not available: {0}")]
    CharacteristicUnavailable(String),

    /// Operation timed out
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ergolink operations
pub type Result<T> = std::result::Result<T, TrainerError>;

impl TrainerError {
    /// Whether the error is a fatal precondition failure
    ///
    /// Precondition failures (no adapter, radio off) abort scanning and
    /// connecting before any hardware call and are not worth retrying until
    /// the environment changes.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::AdapterUnavailable | Self::AdapterDisabled)
    }

    /// Whether the error is a transport failure on an established link
    ///
    /// Transport failures surface as a [`ConnectionState`] change and end
    /// the affected stream; whether to reconnect is the caller's decision.
    ///
    /// [`ConnectionState`]: crate::ConnectionState
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::Disconnected | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let precondition = TrainerError::AdapterDisabled;
        assert!(precondition.is_precondition());
        assert!(!precondition.is_transport());

        let transport = TrainerError::Disconnected;
        assert!(transport.is_transport());
        assert!(!transport.is_precondition());

        let missing = TrainerError::CharacteristicUnavailable("2AD9".to_string());
        assert!(!missing.is_precondition());
        assert!(!missing.is_transport());
    }

    #[test]
    fn test_error_display() {
        let error = TrainerError::DeviceNotFound("AA:BB:CC:DD:EE:FF".to_string());
        let text = format!("{error}");
        assert!(text.contains("not found"));
        assert!(text.contains("AA:BB:CC:DD:EE:FF"));

        let timeout = TrainerError::Timeout { timeout_ms: 15000 };
        assert!(format!("{timeout}").contains("15000ms"));
    }
}
