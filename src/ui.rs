use colored::Colorize;
use reconcile::Report;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Comma-separated names, or a dash when empty
pub fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

/// Print the outcome of a deploy or destroy run
pub fn report(report: &Report) {
    section(&format!("{} report", report.operation));
    kv("Deployed", &name_list(&report.deployed));
    kv("Updated", &name_list(&report.updated));
    kv("Destroyed", &name_list(&report.destroyed));
    kv("Unchanged", &name_list(&report.unchanged));
    if !report.skipped.is_empty() {
        kv("Skipped", &name_list(&report.skipped));
    }
    kv(
        "Started",
        &report
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    );
    if let Some(finished) = report.finished_at {
        let elapsed = finished - report.started_at;
        kv("Duration", &format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0));
    }

    for (name, error) in &report.errors {
        self::error(&format!("{name}: {error}"));
    }
    if report.cancelled {
        warn("Run was cancelled before every resource was attempted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_list() {
        assert_eq!(name_list(&[]), "-");
        assert_eq!(name_list(&["a".into()]), "a");
        assert_eq!(name_list(&["a".into(), "b".into()]), "a, b");
    }
}
