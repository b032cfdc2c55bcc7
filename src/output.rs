use crate::runner::RunOutcome;
use crate::stats::Statistics;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print evaluation outcomes in the specified format
pub fn print_results(outcomes: &[RunOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(outcomes)),
        OutputFormat::Json => match render_json(outcomes) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing results to JSON: {}", e),
        },
    }
}

/// Render outcomes as plain text, one block per evaluation
fn render_plain(outcomes: &[RunOutcome]) -> String {
    if outcomes.is_empty() {
        return "No evaluations configured.\n".to_string();
    }

    let mut text = String::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        text.push_str(&format!("=== Evaluation {}: {} ===\n", i + 1, outcome.dataset));
        text.push_str(&format!("{:<12} {}\n", "Items", outcome.data_num));
        push_statistics(&mut text, &outcome.stat_info);
        text.push_str(&format!("{:<12} {}\n", "Report", outcome.report_path.display()));

        if i < outcomes.len() - 1 {
            text.push('\n');
        }
    }
    text
}

fn push_statistics(text: &mut String, stats: &Statistics) {
    text.push_str(&format!("{:<12} {}\n", "Valid", stats.valid_count));
    text.push_str(&format!("{:<12} {}\n", "Correct", stats.correct_count));
    text.push_str(&format!("{:<12} {}\n", "Incorrect", stats.incorrect_count));
    text.push_str(&format!("{:<12} {:.4}\n", "Accuracy", stats.accuracy));
}

/// Render outcomes as pretty JSON
fn render_json(outcomes: &[RunOutcome]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(outcomes)
}

/// Print a raw single-item judgment
pub fn print_judgment(judgment: &str, format: OutputFormat) {
    match format {
        OutputFormat::Plain => println!("{}", judgment),
        OutputFormat::Json => println!("{}", serde_json::json!({ "judgment_result": judgment })),
    }
}

/// Print the outcome of a successful report check
pub fn print_check(path: &Path, stats: &Statistics, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_check(path, stats)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "report": path.display().to_string(),
                "consistent": true,
                "stat_info": stats,
            })
        ),
    }
}

fn render_check(path: &Path, stats: &Statistics) -> String {
    let mut text = format!("=== Report OK: {} ===\n", path.display());
    push_statistics(&mut text, stats);
    text
}
