//! Prompt assembly.

use thiserror::Error;

use crate::analyzers::AnalyzerOutput;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("source code is too large for the model: prompt is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
}

/// Build the prompt: question, fenced source, then one fenced section per
/// analyzer report.
pub fn build_prompt(question: &str, source: &[u8], reports: &[AnalyzerOutput]) -> String {
    let source = String::from_utf8_lossy(source);
    let report_len: usize = reports.iter().map(|r| r.output.len() + 64).sum();

    let mut prompt = String::with_capacity(question.len() + source.len() + report_len + 8);
    prompt.push_str(question);
    prompt.push_str("```\n");
    prompt.push_str(&source);
    prompt.push_str("\n```");

    for report in reports {
        prompt.push_str("\n\nOutput of ");
        prompt.push_str(&report.name);
        match report.exit_code {
            Some(code) => prompt.push_str(&format!(" (exit {})", code)),
            None => prompt.push_str(" (killed by signal)"),
        }
        if report.truncated {
            prompt.push_str(" [truncated]");
        }
        prompt.push_str(":\n```\n");
        prompt.push_str(report.output.trim_end());
        prompt.push_str("\n```");
    }

    prompt
}

/// Reject prompts larger than `max` bytes.
pub fn check_size(prompt: &str, max: usize) -> Result<(), PromptError> {
    if prompt.len() > max {
        return Err(PromptError::TooLarge {
            size: prompt.len(),
            max,
        });
    }
    Ok(())
}
