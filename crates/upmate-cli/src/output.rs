//! Output formatting for CLI commands

use std::str::FromStr;

use serde::Serialize;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub command: String,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(command: &str, data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }

    pub fn failure(command: &str, data: Option<T>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

/// Writes command results to stdout in the selected format.
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print `data`, using `text` for the human-readable form.
    pub fn emit<T: Serialize>(&self, command: &str, data: T, text: &str) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Text => println!("{text}"),
            OutputFormat::Json => {
                let response = JsonResponse::success(command, data);
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Ok(())
    }

    /// Print a failed result.
    pub fn emit_failure<T: Serialize>(
        &self,
        command: &str,
        data: Option<T>,
        error: &str,
    ) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Text => eprintln!("Error: {error}"),
            OutputFormat::Json => {
                let response = JsonResponse::failure(command, data, error);
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Ok(())
    }
}
