use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchName(pub String);

impl BranchName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the output of `git symbolic-ref --short HEAD`.
    pub fn from_symbolic_ref(output: &str) -> Option<Self> {
        let name = output.trim();
        let name = name.strip_prefix("refs/heads/").unwrap_or(name);
        if name.is_empty() {
            None
        } else {
            Some(Self(name.to_string()))
        }
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
