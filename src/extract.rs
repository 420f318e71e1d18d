//! Decomposition of a work-item body into tasks.
//!
//! The extractor scans the body line by line and recognises, in priority
//! order per line: checkbox items (`- [ ] text`, `- [x] text`), numbered
//! items (`1. text`, `1) text`) and level-two headings (`## text`). Each
//! match becomes one task whose priority is its discovery index. Inline
//! `#<n>` references in a title become dependencies on `task-<n>`.
//!
//! When nothing matches, a single task is synthesised from the work item's
//! title. Extraction is pure and deterministic for a given input.

use crate::core::task::{Impact, Severity, Task, TaskId, TaskType};
use crate::core::work_item::WorkItem;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Which line pattern produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePattern {
    Checkbox,
    Numbered,
    Heading,
    Fallback,
}

impl LinePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinePattern::Checkbox => "checkbox",
            LinePattern::Numbered => "numbered",
            LinePattern::Heading => "heading",
            LinePattern::Fallback => "fallback",
        }
    }
}

struct Patterns {
    checkbox: Regex,
    numbered: Regex,
    heading: Regex,
    reference: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        checkbox: Regex::new(r"^[-*+]\s+\[([ xX])\]\s+(.+)$").expect("checkbox pattern"),
        numbered: Regex::new(r"^\d+[.)]\s+(.+)$").expect("numbered pattern"),
        heading: Regex::new(r"^##\s+(.+)$").expect("heading pattern"),
        reference: Regex::new(r"#(\d+)\b").expect("reference pattern"),
    })
}

/// Keyword table for task type inference. First match wins.
const TYPE_KEYWORDS: &[(TaskType, &[&str])] = &[
    (TaskType::Bug, &["bug", "fix", "broken", "crash", "regression"]),
    (TaskType::Refactor, &["refactor", "cleanup", "clean up", "restructure"]),
    (TaskType::Docs, &["doc", "readme", "guide", "changelog"]),
    (TaskType::Test, &["test", "spec", "coverage"]),
    (TaskType::Deployment, &["deploy", "release", "rollout", "publish"]),
];

/// A task line recognised by [`TaskExtractor::parse_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub pattern: LinePattern,
    pub title: String,
    /// Set for checkbox lines that are already ticked.
    pub checked: bool,
}

/// Pattern-based work-item decomposer.
#[derive(Debug, Clone, Default)]
pub struct TaskExtractor;

impl TaskExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Decompose a work item into tasks.
    pub fn extract(&self, work_item: &WorkItem) -> Vec<Task> {
        let mut tasks = self.extract_from_body(&work_item.body, &work_item.title);
        let reference = work_item.reference();
        for task in &mut tasks {
            task.metadata
                .insert("work_item".to_string(), reference.clone());
        }
        tasks
    }

    /// Decompose a raw body, falling back to `title` when no line matches.
    pub fn extract_from_body(&self, body: &str, title: &str) -> Vec<Task> {
        let mut tasks = Vec::new();

        for (line_no, line) in body.lines().enumerate() {
            let Some(parsed) = self.parse_line(line) else {
                continue;
            };
            let index = tasks.len() + 1;
            let mut task = self.build_task(index, &parsed.title, line.trim())
                .with_metadata("line", (line_no + 1).to_string())
                .with_metadata("pattern", parsed.pattern.as_str());
            if parsed.checked {
                task = task.with_metadata("checked", "true");
            }
            tasks.push(task);
        }

        if tasks.is_empty() {
            debug!(title, "no structured tasks found, synthesizing one");
            let task = self
                .build_task(1, title.trim(), body.trim())
                .with_metadata("pattern", LinePattern::Fallback.as_str());
            tasks.push(task);
        }

        debug!(count = tasks.len(), "extracted tasks");
        tasks
    }

    /// Recognise a single line. Leading indentation is ignored.
    pub fn parse_line(&self, line: &str) -> Option<ParsedLine> {
        let line = line.trim();
        let p = patterns();

        if let Some(caps) = p.checkbox.captures(line) {
            return Some(ParsedLine {
                pattern: LinePattern::Checkbox,
                title: caps[2].trim().to_string(),
                checked: !caps[1].trim().is_empty(),
            });
        }
        if let Some(caps) = p.numbered.captures(line) {
            return Some(ParsedLine {
                pattern: LinePattern::Numbered,
                title: caps[1].trim().to_string(),
                checked: false,
            });
        }
        if let Some(caps) = p.heading.captures(line) {
            return Some(ParsedLine {
                pattern: LinePattern::Heading,
                title: caps[1].trim().to_string(),
                checked: false,
            });
        }
        None
    }

    /// Task ids referenced as `#<n>` inside a title.
    pub fn references(&self, title: &str) -> Vec<TaskId> {
        let mut refs: Vec<TaskId> = patterns()
            .reference
            .captures_iter(title)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .map(TaskId::numbered)
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Infer the task type from title keywords.
    pub fn infer_type(&self, title: &str) -> TaskType {
        let lower = title.to_lowercase();
        TYPE_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(task_type, _)| *task_type)
            .unwrap_or_default()
    }

    fn build_task(&self, index: usize, title: &str, description: &str) -> Task {
        let id = TaskId::numbered(index);
        let task_type = self.infer_type(title);
        let mut task = Task::new(id.clone(), title)
            .with_type(task_type)
            .with_priority(index as u32);
        task.description = description.to_string();

        if task_type == TaskType::Bug {
            task.severity = Severity::High;
            task.impact = Impact::High;
        }

        for dep in self.references(title) {
            if dep != id {
                task.dependencies.insert(dep);
            }
        }
        task
    }
}
