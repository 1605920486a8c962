//! Macros for orchestration error handling.
//!
//! Convenience macros for creating and returning [`crate::error::StrataError`]
//! instances with reduced boilerplate.

/// Creates a [`crate::error::StrataError`] from an error kind and description.
///
/// Accepts an optional dynamic detail and an optional source error.
#[macro_export]
macro_rules! strata_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::StrataError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::StrataError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::StrataError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::StrataError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns a [`crate::error::StrataError`] from the current
/// function, combining error creation with an early return.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::strata_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::strata_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::strata_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
