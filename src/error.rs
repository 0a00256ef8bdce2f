//! Application error type.
//!
//! `cv` keeps a single error type carrying a process exit code plus a
//! human-readable message. The exit code doubles as the error taxonomy:
//!
//! - [`EXIT_USAGE`]: bad flags, unreadable files, malformed CSV/JSON
//! - [`EXIT_INSUFFICIENT_DATA`]: too few inlier points for the model's
//!   free-parameter count (detected before the doomed solve is attempted)
//! - [`EXIT_NUMERIC`]: the least-squares solver failed to converge, or some
//!   other numeric breakdown (non-finite predictions, degenerate data)
//!
//! Hitting the iteration cap is *not* an error; the fit returns a normal
//! result flagged as non-converged.

/// Usage/input errors.
pub const EXIT_USAGE: u8 = 2;
/// Fewer inliers than the model can be identified from.
pub const EXIT_INSUFFICIENT_DATA: u8 = 3;
/// Solver non-convergence and other numeric failures.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Shorthand for the "inliers <= free parameters" failure.
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::new(EXIT_INSUFFICIENT_DATA, message)
    }

    /// Shorthand for solver non-convergence / numeric failures.
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
