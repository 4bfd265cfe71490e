//! Exit status handling for the command-line driver.
//!
//! Every step runs inside [`guarded`], which maps pipeline errors to their
//! stable numeric code and turns a panic into an internal error instead of
//! an abort with a backtrace.

use std::panic::{catch_unwind, AssertUnwindSafe};

use ratecast_core::ForecastError;
use tracing::error;

/// Exit status for a panic or any failure outside the pipeline error taxonomy.
pub const INTERNAL_ERROR: u8 = 1;

/// Exit status reported for `error`.
pub fn exit_status(error: &ForecastError) -> u8 {
    u8::try_from(error.to_code()).unwrap_or(INTERNAL_ERROR)
}

/// Run a step with standardized error handling.
///
/// Returns the process exit status: 0 on success, the error's code after
/// logging it, or [`INTERNAL_ERROR`] for a caught panic.
pub fn guarded<F>(step: &str, f: F) -> u8
where
    F: FnOnce() -> Result<(), ForecastError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!(step, code = e.to_code(), "{}", e);
            exit_status(&e)
        }
        Err(_) => {
            error!(step, "panic in {} step", step);
            INTERNAL_ERROR
        }
    }
}
