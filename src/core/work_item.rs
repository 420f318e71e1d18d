//! The originating unit of requested work.

use serde::{Deserialize, Serialize};

/// A work request supplied by an external tracker.
///
/// Only `title` and `body` are needed for decomposition; the rest is
/// carried through to task metadata and the execution report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Option<String>,
    pub issue_number: Option<u64>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub url: Option<String>,
}

impl WorkItem {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            ..Self::default()
        }
    }

    pub fn with_issue(mut self, number: u64) -> Self {
        self.issue_number = Some(number);
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Short human-readable reference (`#42`, the url, the id, or the title).
    pub fn reference(&self) -> String {
        if let Some(number) = self.issue_number {
            format!("#{}", number)
        } else if let Some(url) = &self.url {
            url.clone()
        } else if let Some(id) = &self.id {
            id.clone()
        } else {
            self.title.clone()
        }
    }
}
