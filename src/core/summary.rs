//! Run summary rendering.
//!
//! [`render`] depends only on the step results: they are sorted by
//! declaration position and carry no run id or timing, so two runs with
//! the same results render the same text regardless of completion order.
//! [`render_header`] names the run; sinks prepend it where they want it.

use crate::domain::{RoutineRun, StepResult};

/// Longest preview of a step's output or error, in characters
pub const PREVIEW_CHARS: usize = 60;

/// One-line title identifying the run
pub fn render_header(run: &RoutineRun) -> String {
    format!(
        "Morning routine {} (triggered {})",
        run.id,
        run.triggered_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Render a run's results as a human-readable digest
pub fn render(run: &RoutineRun) -> String {
    let mut results: Vec<&StepResult> = run.results.iter().collect();
    results.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.step_name.cmp(&b.step_name))
    });

    let name_width = results
        .iter()
        .map(|r| r.step_name.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();

    for result in &results {
        out.push_str(&format!(
            "  {:<name_width$}  {:<9}  {}\n",
            result.step_name,
            result.status.label(),
            preview(result),
            name_width = name_width
        ));
    }

    out.push_str(&format!(
        "Overall: {} ({}/{} steps succeeded)\n",
        run.overall_status,
        run.succeeded(),
        run.results.len()
    ));

    out
}

/// One-line preview of a step's output or error
fn preview(result: &StepResult) -> String {
    let text = match (&result.output, &result.error) {
        (_, Some(error)) => format!("error: {}", error),
        (Some(output), None) => output.text.clone(),
        (None, None) => String::new(),
    };
    truncate(&single_line(&text), PREVIEW_CHARS)
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Payload, StepError};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 10), "abcdefg...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_single_line_collapses_whitespace() {
        assert_eq!(single_line("a\n  b\tc\n"), "a b c");
    }

    #[test]
    fn test_render_layout() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
        let id = Uuid::nil();
        let mut run = RoutineRun::new(id, at);
        run.record(StepResult::failure(
            "news_fetch",
            1,
            StepError::Invocation {
                message: "HTTP 500".to_string(),
            },
            at,
            at,
        ));
        run.record(StepResult::success(
            "alarm",
            0,
            Payload::text("Alarm sounded\nsuccessfully."),
            at,
            at,
        ));
        let run = run.finalize();

        assert_eq!(
            render_header(&run),
            "Morning routine 00000000-0000-0000-0000-000000000000 (triggered 2026-03-10 07:00:00 UTC)"
        );

        let expected = "\
  alarm       success    Alarm sounded successfully.
  news_fetch  failed     error: HTTP 500
Overall: partial_failure (1/2 steps succeeded)
";
        assert_eq!(render(&run), expected);
    }

    #[test]
    fn test_same_results_render_same_text_across_runs() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 11, 7, 0, 3).unwrap();
        let alarm = StepResult::success("alarm", 0, Payload::text("Alarm sounded"), at, at);

        let mut first = RoutineRun::new(Uuid::new_v4(), at);
        first.record(alarm.clone());
        let mut second = RoutineRun::new(Uuid::new_v4(), later);
        second.record(alarm);

        let (first, second) = (first.finalize(), second.finalize());
        assert_eq!(render(&first), render(&second));
        assert_ne!(render_header(&first), render_header(&second));
    }
}
