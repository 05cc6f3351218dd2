//! Scenario narration and the end-of-run roll-up.
//!
//! Frames are narrated as they arrive so an interleaved two-client run
//! stays readable; each scenario folds into a [`TestResult`] and the
//! roll-up prints one verdict line per scenario.

use colored::*;
use std::time::Duration;

use crate::sse_client::Frame;

/// Outcome of one scenario run.
#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    /// Failure detail, or a short note on what a pass established.
    pub message: Option<String>,
    pub duration: Duration,
}

/// Narrate one received frame under the client it arrived on. The two
/// simulated clients get fixed, distinct colors so their frames can be
/// told apart when the output interleaves.
pub fn print_frame(client_label: &str, frame: &Frame) {
    let label = if client_label.starts_with("Client 1") {
        client_label.bright_blue()
    } else {
        client_label.bright_magenta()
    };

    println!(
        "\n[{}] {} frame, sequence {}",
        label.bold(),
        frame.kind.yellow(),
        frame.sequence
    );

    // Heartbeats carry no payload; skip the body rather than print "null".
    if frame.payload.is_null() {
        return;
    }
    if let Ok(pretty) = serde_json::to_string_pretty(&frame.payload) {
        for line in pretty.lines() {
            println!("   {}", line.dimmed());
        }
    }
}

/// One verdict line per scenario, then the pass count.
pub fn print_test_summary(results: &[TestResult]) {
    for result in results {
        let verdict = if result.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "  {} {} ({})",
            verdict,
            result.scenario,
            format_duration(result.duration).dimmed()
        );
        if let Some(message) = &result.message {
            println!("       {}", message.dimmed());
        }
    }

    let passed = results.iter().filter(|result| result.passed).count();
    println!(
        "\n{} of {} scenarios passed",
        passed.to_string().bold(),
        results.len()
    );
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}
