//! Output formatting for analysis results.
//!
//! Supports two output formats:
//! - Pretty: the analysis text under a coloured banner
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::analyzers::AnalyzerOutput;
use crate::client::{Completion, Usage};

pub const ANALYSIS_BANNER: &str = "=== ChatGPT Analysis ===";

/// JSON report structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub file: String,
    pub model: String,
    pub analyzers: Vec<JsonAnalyzer>,
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Summary of one analyzer run included in the JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonAnalyzer {
    pub name: String,
    pub exit_code: Option<i32>,
    pub output_bytes: usize,
    pub truncated: bool,
}

/// Build the JSON report for a completed analysis.
pub fn json_report(
    file: &str,
    model: &str,
    reports: &[AnalyzerOutput],
    completion: &Completion,
) -> JsonReport {
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        file: file.to_string(),
        model: completion.model.clone().unwrap_or_else(|| model.to_string()),
        analyzers: reports
            .iter()
            .map(|r| JsonAnalyzer {
                name: r.name.clone(),
                exit_code: r.exit_code,
                output_bytes: r.output.len(),
                truncated: r.truncated,
            })
            .collect(),
        analysis: completion.content.clone(),
        finish_reason: completion.finish_reason.clone(),
        usage: completion.usage,
    }
}

/// Write results in JSON format.
pub fn write_json<W: Write>(
    out: &mut W,
    file: &str,
    model: &str,
    reports: &[AnalyzerOutput],
    completion: &Completion,
) -> anyhow::Result<()> {
    let report = json_report(file, model, reports, completion);
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

/// Write results in pretty format.
pub fn write_pretty<W: Write>(out: &mut W, completion: &Completion) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", ANALYSIS_BANNER.bold().cyan())?;
    writeln!(out, "{}", completion.content)?;

    if completion.finish_reason.as_deref() == Some("length") {
        eprintln!(
            "{}",
            "Warning: the answer was cut off at the model's output limit".yellow()
        );
    }
    Ok(())
}

/// Report a response that carried no answer.
pub fn write_unexpected<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Unexpected response from API.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> Completion {
        Completion {
            model: None,
            content: "Use snprintf.".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: None,
        }
    }

    #[test]
    fn test_json_report_fields() {
        let reports = vec![AnalyzerOutput {
            name: "cppcheck".to_string(),
            command: "cppcheck 'a.c'".to_string(),
            exit_code: Some(1),
            output: "a.c:3: error".to_string(),
            truncated: false,
        }];

        let report = json_report("a.c", "gpt-4o", &reports, &completion());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["file"], "a.c");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["analysis"], "Use snprintf.");
        assert_eq!(json["analyzers"][0]["name"], "cppcheck");
        assert_eq!(json["analyzers"][0]["exit_code"], 1);
        assert_eq!(json["analyzers"][0]["output_bytes"], 12);
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn test_json_report_prefers_reported_model() {
        let mut c = completion();
        c.model = Some("gpt-4o-2024-08-06".to_string());
        let report = json_report("a.c", "gpt-4o", &[], &c);
        assert_eq!(report.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_pretty_output_has_banner_and_answer() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        write_pretty(&mut out, &completion()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("\n{}\nUse snprintf.\n", ANALYSIS_BANNER));
    }

    #[test]
    fn test_write_json_parses_back() {
        let mut out = Vec::new();
        write_json(&mut out, "a.c", "gpt-4o", &[], &completion()).unwrap();

        let report: JsonReport = serde_json::from_slice(&out).unwrap();
        assert_eq!(report.analysis, "Use snprintf.");
        assert!(report.analyzers.is_empty());
    }

    #[test]
    fn test_unexpected_message() {
        let mut out = Vec::new();
        write_unexpected(&mut out).unwrap();
        assert_eq!(out, b"Unexpected response from API.\n");
    }
}
