use std::fmt;
use std::str::FromStr;

/// Soft cap on the title line. Longer summaries are committed as-is.
pub const SUMMARY_SOFT_LIMIT: usize = 72;

/// Keep-a-Changelog category of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Changed,
    Deprecated,
    Removed,
    Fixed,
    Security,
}

impl ChangeType {
    pub const ALL: [ChangeType; 6] = [
        ChangeType::Added,
        ChangeType::Changed,
        ChangeType::Deprecated,
        ChangeType::Removed,
        ChangeType::Fixed,
        ChangeType::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "Added",
            ChangeType::Changed => "Changed",
            ChangeType::Deprecated => "Deprecated",
            ChangeType::Removed => "Removed",
            ChangeType::Fixed => "Fixed",
            ChangeType::Security => "Security",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown change type '{value}'"))
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Title and body of a commit, plus the optional category the model chose.
///
/// `change_type` and `scope` are shown to the user but never written into
/// the commit text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub summary: String,
    pub description: String,
    pub change_type: Option<ChangeType>,
    pub scope: Option<String>,
}

impl CommitMessage {
    pub fn new(summary: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            summary: summary.into().trim().to_string(),
            description: description.into().trim().to_string(),
            change_type: None,
            scope: None,
        }
    }

    pub fn with_category(mut self, change_type: Option<ChangeType>, scope: Option<String>) -> Self {
        self.change_type = change_type;
        self.scope = scope
            .map(|scope| scope.trim().to_string())
            .filter(|scope| !scope.is_empty());
        self
    }

    /// `Fixed [parser]`, `Fixed`, or `None` when no type was chosen.
    pub fn category_label(&self) -> Option<String> {
        let change_type = self.change_type?;
        Some(match &self.scope {
            Some(scope) => format!("{change_type} [{scope}]"),
            None => change_type.to_string(),
        })
    }

    /// Git message text: summary, then a blank line and the description when
    /// there is one.
    pub fn format(&self) -> String {
        if self.description.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n\n{}", self.summary, self.description)
        }
    }

    pub fn summary_exceeds_limit(&self) -> bool {
        self.summary.chars().count() > SUMMARY_SOFT_LIMIT
    }
}

/// Full object id of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_summary_only() {
        let message = CommitMessage::new("fix: x", "");
        assert_eq!(message.format(), "fix: x");
    }

    #[test]
    fn formats_summary_and_description() {
        let message = CommitMessage::new("Update README", "Clarify usage instructions.\n");
        assert_eq!(
            message.format(),
            "Update README\n\nClarify usage instructions."
        );
    }

    #[test]
    fn whitespace_description_is_dropped() {
        let message = CommitMessage::new("  chore: bump deps ", " \n ");
        assert_eq!(message.summary, "chore: bump deps");
        assert_eq!(message.format(), "chore: bump deps");
    }

    #[test]
    fn flags_long_summary() {
        assert!(!CommitMessage::new("a".repeat(72), "").summary_exceeds_limit());
        assert!(CommitMessage::new("a".repeat(73), "").summary_exceeds_limit());
    }

    #[test]
    fn change_type_parses_case_insensitively() {
        assert_eq!("fixed".parse::<ChangeType>(), Ok(ChangeType::Fixed));
        assert_eq!(" Security ".parse::<ChangeType>(), Ok(ChangeType::Security));
        assert!("Refactored".parse::<ChangeType>().is_err());
    }

    #[test]
    fn category_is_not_part_of_commit_text() {
        let message = CommitMessage::new("Handle empty input", "Avoids a panic.")
            .with_category(Some(ChangeType::Fixed), Some(" parser ".to_string()));

        assert_eq!(message.category_label().as_deref(), Some("Fixed [parser]"));
        assert_eq!(message.format(), "Handle empty input\n\nAvoids a panic.");
    }

    #[test]
    fn blank_scope_is_dropped() {
        let message =
            CommitMessage::new("Add export", "").with_category(Some(ChangeType::Added), Some("  ".into()));
        assert_eq!(message.scope, None);
        assert_eq!(message.category_label().as_deref(), Some("Added"));
        assert_eq!(CommitMessage::new("x", "").category_label(), None);
    }

    #[test]
    fn short_commit_id() {
        let id = CommitId("0123456789abcdef".to_string());
        assert_eq!(id.short(), "0123456");
        assert_eq!(CommitId("abc".to_string()).short(), "abc");
    }
}
