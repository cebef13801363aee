use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Plan file not found: {path}")]
    PlanNotFound { path: String },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid parameter '{raw}': expected key=value")]
    InvalidParameter { raw: String },

    #[error("Harness error: {0}")]
    Harness(#[from] crossbench::HarnessError),

    #[error("{failed} of {total} benchmarks failed")]
    BenchmarksFailed { failed: usize, total: usize },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::InvalidPlan(_) => 1,
            CliError::Io(_) => 2,
            CliError::InvalidParameter { .. } => 3,
            CliError::PlanNotFound { .. } => 5,
            CliError::BenchmarksFailed { .. } => 10,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Format error for user-friendly display
pub fn format_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<CliError>() {
        Some(CliError::PlanNotFound { path }) => {
            format!("Plan File Not Found: {}\n\nRun 'crossbench sample-config --output {}' to create one.", path, path)
        }
        Some(CliError::InvalidParameter { raw }) => {
            format!("Invalid Parameter: '{}'\n\nParameters take the form key=value, e.g. --param itemCount=100 or --param db.latencyMs=2.", raw)
        }
        Some(CliError::InvalidPlan(reason)) => {
            format!("Invalid Plan: {}\n\nRun 'crossbench sample-config' for a starter plan.", reason)
        }
        _ => format!("{:#}", error),
    }
}

/// Exit code for an error bubbling out of a command
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}
