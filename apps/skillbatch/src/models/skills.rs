//! Skill categories and the two-list result returned by the extraction service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator used when a skill list is flattened into a single artifact cell.
pub const SKILL_SEPARATOR: &str = ",";

/// Cell values that a previous export may have written for "no value".
const BLANK_PLACEHOLDERS: &[&str] = &["nan", "none", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    Hard,
    Soft,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Hard => "hard",
            SkillCategory::Soft => "soft",
        }
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(SkillCategory::Hard),
            "soft" => Ok(SkillCategory::Soft),
            other => Err(format!("unknown skill category '{other}'")),
        }
    }
}

/// Hard and soft skills extracted from one vacancy. Both lists are always
/// present; a failed extraction is simply two empty lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillResult {
    #[serde(default)]
    pub hard: Vec<String>,
    #[serde(default)]
    pub soft: Vec<String>,
}

impl SkillResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a result from an arbitrary JSON document. A field that is not a
    /// list made only of strings is read as an empty list.
    pub fn from_value(value: &Value) -> Self {
        Self {
            hard: string_list(value.get("hard")),
            soft: string_list(value.get("soft")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hard.is_empty() && self.soft.is_empty()
    }

    pub fn hard_joined(&self) -> String {
        join_skills(&self.hard)
    }

    pub fn soft_joined(&self) -> String {
        join_skills(&self.soft)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

/// Flattens a skill list into one cell. Embedded commas are not escaped.
pub fn join_skills(skills: &[String]) -> String {
    skills.join(SKILL_SEPARATOR)
}

/// Splits a flattened cell back into trimmed, non-empty skills.
pub fn split_skills(cell: &str) -> Vec<String> {
    if is_blank_cell(cell) {
        return Vec::new();
    }
    cell.split(SKILL_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// True for empty/whitespace cells and for the textual "no value" placeholders.
pub fn is_blank_cell(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty()
        || BLANK_PLACEHOLDERS
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
}
