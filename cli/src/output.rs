use std::io::{self, Write};

use crossbench::BenchmarkResponse;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// A response tagged with the plan entry that produced it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelledResponse {
    pub benchmark: String,
    pub repetition: u32,
    #[serde(flatten)]
    pub response: BenchmarkResponse,
}

/// Registered backends and operations
#[derive(Debug, Serialize)]
pub struct Listing {
    pub backends: Vec<String>,
    pub operations: Vec<String>,
}

pub struct OutputManager {
    format: OutputFormat,
}

impl OutputManager {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print_response(&self, response: &BenchmarkResponse) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(response),
            OutputFormat::Table => {
                let rows = [(response.operation_type.as_str(), response)];
                self.write(&render_table(&rows))
            }
        }
    }

    pub fn print_plan_results(&self, results: &[LabelledResponse]) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(results),
            OutputFormat::Table => {
                let rows: Vec<_> = results
                    .iter()
                    .map(|r| (r.benchmark.as_str(), &r.response))
                    .collect();
                self.write(&render_table(&rows))
            }
        }
    }

    pub fn print_listing(&self, listing: &Listing) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(listing),
            OutputFormat::Table => {
                let mut out = String::from("Backends:\n");
                for backend in &listing.backends {
                    out.push_str(&format!("  {}\n", backend));
                }
                out.push_str("\nOperations:\n");
                for operation in &listing.operations {
                    out.push_str(&format!("  {}\n", operation));
                }
                self.write(&out)
            }
        }
    }

    /// Print verbatim text (Prometheus exposition, TOML)
    pub fn print_raw(&self, text: &str) -> Result<()> {
        self.write(text)
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let mut text = serde_json::to_string_pretty(value)?;
        text.push('\n');
        self.write(&text)
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

const HEADERS: [&str; 9] = [
    "BENCHMARK", "BACKEND", "STATUS", "ITEMS", "DURATION", "AVG", "ITEMS/S", "P50", "P99",
];

fn render_table(rows: &[(&str, &BenchmarkResponse)]) -> String {
    let cells: Vec<[String; 9]> = rows
        .iter()
        .map(|(label, response)| {
            [
                label.to_string(),
                response.backend.clone(),
                if response.success { "ok" } else { "FAILED" }.to_string(),
                response.items_processed.to_string(),
                format_nanos(response.total_duration_ns),
                format_nanos(response.avg_operation_duration_ns),
                format!("{:.1}", response.throughput),
                summary_nanos(response, "p50"),
                summary_nanos(response, "p99"),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |row: &[&str]| {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };

    push_row(&HEADERS);
    for row in &cells {
        push_row(&row.iter().map(String::as_str).collect::<Vec<_>>());
    }

    for (label, response) in rows {
        if let Some(message) = &response.error_message {
            out.push_str(&format!("\n{}: {}", label, message));
        }
    }
    if rows.iter().any(|(_, r)| r.error_message.is_some()) {
        out.push('\n');
    }
    out
}

fn summary_nanos(response: &BenchmarkResponse, key: &str) -> String {
    response
        .metrics
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(Value::as_u64)
        .map(format_nanos)
        .unwrap_or_else(|| "-".to_string())
}

/// Human-readable duration from integer nanoseconds.
pub fn format_nanos(nanos: u64) -> String {
    match nanos {
        0..=999 => format!("{}ns", nanos),
        1_000..=999_999 => format!("{:.1}µs", nanos as f64 / 1e3),
        1_000_000..=999_999_999 => format!("{:.2}ms", nanos as f64 / 1e6),
        _ => format!("{:.2}s", nanos as f64 / 1e9),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn response(success: bool) -> BenchmarkResponse {
        BenchmarkResponse {
            operation_type: "read".to_string(),
            backend: "memory".to_string(),
            run_name: "memory-read-x".to_string(),
            success,
            error_message: (!success).then(|| "Operation execution failed: boom".to_string()),
            items_processed: 10,
            total_duration_ns: 2_500_000,
            avg_operation_duration_ns: 250_000,
            throughput: 4000.0,
            metrics: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_format_nanos() {
        assert_eq!(format_nanos(999), "999ns");
        assert_eq!(format_nanos(1_500), "1.5µs");
        assert_eq!(format_nanos(2_500_000), "2.50ms");
        assert_eq!(format_nanos(3_000_000_000), "3.00s");
    }

    #[test]
    fn test_table_lists_failures() {
        let ok = response(true);
        let failed = response(false);
        let table = render_table(&[("first", &ok), ("second", &failed)]);

        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("BENCHMARK"));
        assert!(lines[1].starts_with("first"));
        assert!(lines[1].contains("ok"));
        assert!(lines[2].contains("FAILED"));
        assert!(lines[1].contains("2.50ms"));
        assert!(lines[1].ends_with('-'));
        assert!(table.contains("second: Operation execution failed: boom"));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
