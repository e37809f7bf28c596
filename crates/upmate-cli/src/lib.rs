//! upmate CLI - terminal front end for the upmate SDK
//!
//! This crate provides a command-line interface for:
//! - Running an update check under either display policy
//! - Presenting an update surface directly
//! - Inspecting and clearing the persisted version state and identity

pub mod cli;
pub mod config;
pub mod console;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use console::ConsoleGateway;
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Update check failed (transport, status or decode failure)
/// - 3: Invalid input - bad arguments or configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Update check failed (exit code 2)
    CheckFailed = 2,
    /// Invalid input provided (exit code 3)
    InvalidInput = 3,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::CheckFailed => "CHECK_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
        }
    }
}
