use std::fmt::Write;

use gate_defs::{group_by_chart, CheckRunOutput, DiffOutcome, DiffStatus};

pub const CHECK_TITLE: &str = "Helm Diff";
pub const IN_PROGRESS_SUMMARY: &str = "Analyzing chart changes...";
/// GitHub rejects check run text longer than this.
pub const MAX_CHECK_TEXT: usize = 65535;
/// GitHub rejects issue comment bodies longer than this.
pub const MAX_COMMENT_BODY: usize = 65536;
pub const TRUNCATION_SUFFIX: &str = "\n\n... (output truncated)";

pub fn conclusion(outcomes: &[DiffOutcome]) -> &'static str {
    if outcomes.iter().any(|o| o.status() == DiffStatus::Failed) {
        "failure"
    } else {
        "success"
    }
}

pub fn comment_marker(app_name: &str, chart: &str) -> String {
    format!("<!-- {}: {} -->", app_name, chart)
}

/// Output block for the completed check run covering every chart of a PR.
pub fn check_run_output(outcomes: &[DiffOutcome]) -> CheckRunOutput {
    let grouped = group_by_chart(outcomes);
    let (changed, unchanged): (Vec<_>, Vec<_>) = grouped
        .into_iter()
        .partition(|(_, chart_outcomes)| chart_outcomes.iter().any(|o| o.needs_attention()));

    let summary = format!(
        "Analyzed {} chart(s): {} with changes, {} unchanged",
        changed.len() + unchanged.len(),
        changed.len(),
        unchanged.len()
    );

    let mut text = String::new();
    for (chart, chart_outcomes) in &changed {
        let _ = write!(text, "## {}\n\n", chart);
        for outcome in chart_outcomes {
            write_environment_section(&mut text, outcome);
        }
    }
    if !unchanged.is_empty() {
        text.push_str("## Unchanged charts\n\n");
        text.push_str(
            "The following charts were analyzed and had no changes across all environments:\n\n",
        );
        for (chart, _) in &unchanged {
            let _ = writeln!(text, "- `{}`", chart);
        }
        text.push('\n');
    }

    CheckRunOutput {
        title: CHECK_TITLE.to_string(),
        summary,
        text: Some(truncate(text)),
    }
}

fn write_environment_section(text: &mut String, outcome: &DiffOutcome) {
    let _ = write!(
        text,
        "<details><summary>{} : {}</summary>\n\n",
        outcome.environment(),
        outcome.status().label()
    );
    if outcome.status() == DiffStatus::Failed {
        let _ = writeln!(text, "{}", outcome.summary());
    } else if outcome.semantic_diff().is_empty() && outcome.line_diff().is_empty() {
        text.push_str("No changes detected.\n");
    } else {
        if !outcome.semantic_diff().is_empty() {
            text.push_str("**Semantic Diff (dyff):**\n");
            let _ = write!(text, "```diff\n{}\n```\n\n", outcome.semantic_diff());
        }
        if !outcome.line_diff().is_empty() {
            text.push_str("**Unified Diff (line-based):**\n");
            let _ = write!(text, "```diff\n{}\n```\n", outcome.line_diff());
        }
    }
    text.push_str("\n</details>\n\n");
}

/// Caps `text` at `MAX_CHECK_TEXT` bytes, cutting on a char boundary.
pub fn truncate(text: String) -> String {
    truncate_to(text, MAX_CHECK_TEXT)
}

fn truncate_to(text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    if limit < TRUNCATION_SUFFIX.len() {
        return String::new();
    }
    let mut cut = limit - TRUNCATION_SUFFIX.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = text[..cut].to_string();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

fn comment_section(outcome: &DiffOutcome, detail: &str) -> String {
    match outcome.status() {
        DiffStatus::Failed => format!(
            "<details>\n<summary><b>{}</b> : Error details</summary>\n\n{}\n\n</details>\n\n",
            outcome.environment(),
            detail
        ),
        _ => format!(
            "<details>\n<summary><b>{}</b> : View diff</summary>\n\n```diff\n{}\n```\n\n</details>\n\n",
            outcome.environment(),
            detail
        ),
    }
}

fn comment_detail(outcome: &DiffOutcome) -> &str {
    match outcome.status() {
        DiffStatus::Failed => outcome.summary(),
        _ => outcome.preferred_diff(),
    }
}

/// PR comment body for one chart. `outcomes` must all belong to that chart.
pub fn format_comment(app_name: &str, app_url: Option<&str>, outcomes: &[DiffOutcome]) -> String {
    let chart = outcomes.first().map(|o| o.chart()).unwrap_or_default();
    let mut body = String::new();

    let _ = writeln!(body, "{}", comment_marker(app_name, chart));
    let _ = write!(body, "## 📊 Helm Diff Report: `{}`\n\n", chart);

    let failed = outcomes.iter().any(|o| o.status() == DiffStatus::Failed);
    let changed = outcomes
        .iter()
        .filter(|o| o.status() == DiffStatus::Changed)
        .count();
    if failed {
        body.push_str("❌ **Status:** Failed to analyze chart\n\n");
    } else if changed > 0 {
        let _ = write!(
            body,
            "✅ **Status:** Analysis complete, {} environment(s) with changes\n\n",
            changed
        );
    } else {
        body.push_str("✅ **Status:** Analysis complete, No changes detected\n\n");
    }

    body.push_str("| Environment | Status |\n");
    body.push_str("|-------------|--------|\n");
    for outcome in outcomes {
        let label = match outcome.status() {
            DiffStatus::Failed => "❌ Error",
            DiffStatus::Changed => "📝 Changed",
            DiffStatus::Unchanged => "✅ No changes",
        };
        let _ = writeln!(body, "| `{}` | {} |", outcome.environment(), label);
    }
    body.push('\n');

    let detailed: Vec<&DiffOutcome> = outcomes
        .iter()
        .filter(|o| o.status() != DiffStatus::Unchanged)
        .collect();

    let mut footer = String::from("---\n");
    match app_url {
        Some(url) if !url.is_empty() => {
            let _ = writeln!(footer, "_Posted by [{}]({})_", app_name, url);
        }
        _ => {
            let _ = writeln!(footer, "_Posted by {}_", app_name);
        }
    }

    let full: Vec<String> = detailed
        .iter()
        .map(|o| comment_section(o, comment_detail(o)))
        .collect();
    let full_len: usize = full.iter().map(|s| s.len()).sum();

    if body.len() + full_len + footer.len() <= MAX_COMMENT_BODY {
        for section in &full {
            body.push_str(section);
        }
    } else {
        // Every environment gets an equal share of what the header and footer leave
        let share =
            MAX_COMMENT_BODY.saturating_sub(body.len() + footer.len()) / detailed.len().max(1);
        for outcome in &detailed {
            let overhead = comment_section(outcome, "").len();
            let detail = truncate_to(
                comment_detail(outcome).to_string(),
                share.saturating_sub(overhead),
            );
            body.push_str(&comment_section(outcome, &detail));
        }
    }

    body.push_str(&footer);
    truncate_to(body, MAX_COMMENT_BODY)
}
