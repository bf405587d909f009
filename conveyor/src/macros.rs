//! Macros for pipeline error handling.
//!
//! Convenience macros for creating and returning
//! [`crate::error::ConveyorError`] instances with reduced boilerplate.

/// Creates a [`crate::error::ConveyorError`] from an error kind and
/// description, with optional dynamic detail.
#[macro_export]
macro_rules! conveyor_error {
    ($kind:expr, $desc:expr) => {
        ConveyorError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        ConveyorError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::ConveyorError`] from the current
/// function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::conveyor_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::conveyor_error!($kind, $desc, $detail))
    };
}
