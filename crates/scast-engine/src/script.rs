//! Script safety checks applied before a render is accepted.

use crate::error::{EngineError, EngineResult};

/// Validates submitted scripts against length and content rules.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    max_chars: usize,
    blocklist: Vec<String>,
}

impl ScriptPolicy {
    pub fn new(max_chars: usize, blocklist: Vec<String>) -> Self {
        let blocklist = blocklist
            .into_iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            max_chars,
            blocklist,
        }
    }

    /// Check a script. Returns the trimmed text on success.
    pub fn validate<'a>(&self, script: &'a str) -> EngineResult<&'a str> {
        let trimmed = script.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_script("script is empty"));
        }
        if trimmed.chars().count() > self.max_chars {
            return Err(EngineError::invalid_script(format!(
                "script exceeds {} characters",
                self.max_chars
            )));
        }

        let lowered = trimmed.to_lowercase();
        for term in &self.blocklist {
            if lowered.contains(term.as_str()) {
                return Err(EngineError::invalid_script(format!(
                    "script contains a disallowed term: {}",
                    term
                )));
            }
        }

        Ok(trimmed)
    }
}
