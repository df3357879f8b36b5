//! Error and status definitions.

/// Outcome recorded in the controller's error context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    #[default]
    Ok,
    /// Two or more edges inside one detection window.
    MultipleCoins,
    /// An edge arrived while a coin was settling.
    CoinDuringProcessing,
    /// The camera produced no frame.
    CameraError,
    /// A frame was taken but could not be written.
    StorageError,
    /// A state overstayed its budget.
    TimeoutError,
}

impl StatusCode {
    /// Human readable text used in console reports.
    pub const fn description(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MultipleCoins => "Multiple coins detected",
            StatusCode::CoinDuringProcessing => "Coin inserted during processing",
            StatusCode::CameraError => "Camera error",
            StatusCode::StorageError => "Storage error",
            StatusCode::TimeoutError => "Timeout error",
        }
    }
}

/// Failure returned by a camera collaborator. No file was durably written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// The sensor did not deliver a frame.
    Sensor,
    /// The frame could not be saved.
    Storage,
}

impl From<CaptureError> for StatusCode {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Sensor => StatusCode::CameraError,
            CaptureError::Storage => StatusCode::StorageError,
        }
    }
}

/// Result type for the console surface.
pub type Result<T> = core::result::Result<T, Error>;

/// Console errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Blank input line.
    EmptyCommand,
    /// Input did not name a known command.
    UnknownCommand,
    /// The station is handling a coin.
    Busy,
    /// The output sink rejected a write.
    Format,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Format
    }
}
