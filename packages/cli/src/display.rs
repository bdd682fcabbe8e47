// ABOUTME: Terminal rendering of tasks and identities
// ABOUTME: Tables, colored labels, and parsing of dates typed on the command line

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use taskmaster_core::{Identity, Task, TaskPriority, TaskStatus};

/// Characters of the id shown in listings
const SHORT_ID_LENGTH: usize = 8;

pub fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    match id.char_indices().nth(SHORT_ID_LENGTH) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

pub fn status_label(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Todo => "todo".normal(),
        TaskStatus::InProgress => "in progress".cyan(),
        TaskStatus::Completed => "completed".green(),
        TaskStatus::Cancelled => "cancelled".dimmed(),
    }
}

pub fn priority_label(priority: TaskPriority) -> ColoredString {
    match priority {
        TaskPriority::Low => "low".dimmed(),
        TaskPriority::Medium => "medium".normal(),
        TaskPriority::High => "high".yellow(),
        TaskPriority::Urgent => "urgent".red().bold(),
    }
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn task_table(tasks: &[Task]) -> Table {
    let now = Utc::now();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["ID", "Title", "Status", "Priority", "Due", "Tags", "Created"]);

    for task in tasks {
        let due = match &task.due_date {
            Some(due) if task.is_overdue(now) => format_date(due).red().to_string(),
            Some(due) => format_date(due),
            None => "—".to_string(),
        };
        let tags = if task.tags.is_empty() {
            "—".to_string()
        } else {
            task.tags.join(", ")
        };

        table.add_row(vec![
            short_id(task).to_string(),
            truncate(&task.title, 40),
            status_label(task.status).to_string(),
            priority_label(task.priority).to_string(),
            due,
            truncate(&tags, 20),
            format_date(&task.created_at),
        ]);
    }

    table
}

/// Task counts per status in workflow order, leaving out empty statuses
pub fn status_breakdown(tasks: &[Task]) -> String {
    TaskStatus::ALL
        .iter()
        .filter_map(|status| {
            let count = tasks.iter().filter(|task| task.status == *status).count();
            (count > 0).then(|| format!("{} {}", count, status.as_str()))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_task(task: &Task) {
    println!("{} {}", task.title.bold(), format!("({})", task.id).dimmed());
    if let Some(description) = &task.description {
        println!("  {}", description);
    }
    println!(
        "  {} {}   {} {}",
        "Status:".dimmed(),
        status_label(task.status),
        "Priority:".dimmed(),
        priority_label(task.priority)
    );
    if let Some(due) = &task.due_date {
        println!("  {} {}", "Due:".dimmed(), format_date(due));
    }
    if !task.tags.is_empty() {
        println!("  {} {}", "Tags:".dimmed(), task.tags.join(", "));
    }
}

pub fn print_identity(identity: &Identity) {
    println!("{} {}", "Signed in as".green(), identity.display_name().bold());
    if let Some(email) = &identity.email {
        println!("  {} {}", "Email:".dimmed(), email);
    }
    println!("  {} {}", "User id:".dimmed(), identity.id);
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp
pub fn parse_due(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    match DateTime::parse_from_rfc3339(input) {
        Ok(timestamp) => Ok(timestamp.with_timezone(&Utc)),
        Err(_) => bail!("Invalid due date '{}': use YYYY-MM-DD", input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("short", 10, "short")]
    #[case("exactly ten", 11, "exactly ten")]
    #[case("a longer title", 8, "a longe…")]
    #[case("émoji ✓ title", 7, "émoji …")]
    fn test_truncate(#[case] input: &str, #[case] max: usize, #[case] expected: &str) {
        assert_eq!(truncate(input, max), expected);
    }

    #[rstest]
    #[case("2024-06-30", Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap())]
    #[case("2024-06-30T15:30:00+02:00", Utc.with_ymd_and_hms(2024, 6, 30, 13, 30, 0).unwrap())]
    fn test_parse_due(#[case] input: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_due(input).unwrap(), expected);
    }

    #[rstest]
    #[case("tomorrow")]
    #[case("2024-13-01")]
    #[case("")]
    fn test_parse_due_rejects(#[case] input: &str) {
        assert!(parse_due(input).is_err());
    }

    fn task_with_status(id: &str, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: id.into(),
            user_id: "u".into(),
            title: id.to_string(),
            description: None,
            status,
            priority: TaskPriority::Medium,
            due_date: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_breakdown_follows_workflow_order() {
        let tasks = vec![
            task_with_status("a", TaskStatus::Completed),
            task_with_status("b", TaskStatus::Todo),
            task_with_status("c", TaskStatus::Todo),
            task_with_status("d", TaskStatus::Cancelled),
        ];
        assert_eq!(status_breakdown(&tasks), "2 todo, 1 completed, 1 cancelled");
        assert_eq!(status_breakdown(&[]), "");
    }

    #[test]
    fn test_task_table_has_row_per_task() {
        let now = Utc::now();
        let task = Task {
            id: "0123456789abcdef".into(),
            user_id: "u".into(),
            title: "Write spec".to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            tags: vec!["docs".to_string()],
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        assert_eq!(short_id(&task), "01234567");

        let table = task_table(&[task.clone(), task]);
        assert_eq!(table.row_iter().count(), 2);
    }
}
