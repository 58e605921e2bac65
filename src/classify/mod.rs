//! Link classification
//!
//! Maps a file label to one of eight category folders using an ordered list of
//! keyword rules. The first matching rule wins; labels that match nothing land
//! in [`Category::Other`], so classification is total.

mod rules;

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::DownloaderError;

pub use rules::{default_rules, MatchForm, Rule};

/// Category bucket, bound to a numbered folder under each year directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SourceData,
    SchoolRankings,
    DepartmentSummaries,
    BasicScience,
    ClinicalDepts,
    PiRankings,
    Geographic,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::SourceData,
        Category::SchoolRankings,
        Category::DepartmentSummaries,
        Category::BasicScience,
        Category::ClinicalDepts,
        Category::PiRankings,
        Category::Geographic,
        Category::Other,
    ];

    /// Two-digit folder prefix (01..=08).
    pub fn number(self) -> u8 {
        match self {
            Category::SourceData => 1,
            Category::SchoolRankings => 2,
            Category::DepartmentSummaries => 3,
            Category::BasicScience => 4,
            Category::ClinicalDepts => 5,
            Category::PiRankings => 6,
            Category::Geographic => 7,
            Category::Other => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::SourceData => "Source_Data",
            Category::SchoolRankings => "School_Rankings",
            Category::DepartmentSummaries => "Department_Summaries",
            Category::BasicScience => "Basic_Science",
            Category::ClinicalDepts => "Clinical_Depts",
            Category::PiRankings => "PI_Rankings",
            Category::Geographic => "Geographic",
            Category::Other => "Other",
        }
    }

    /// e.g. `05_Clinical_Depts`
    pub fn folder_name(self) -> String {
        format!("{:02}_{}", self.number(), self.name())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}_{}", self.number(), self.name())
    }
}

/// Lower-cased label in the shapes rules can match against.
#[derive(Debug)]
pub(crate) struct LabelForms {
    pub raw: String,
    pub normalized: String,
    pub words: Vec<String>,
}

impl LabelForms {
    pub fn new(label: &str) -> Self {
        let raw = label.to_lowercase();
        let normalized = normalize_keyword(&raw);
        let words = raw
            .split(|c: char| c.is_whitespace() || matches!(c, '_' | '-' | '.'))
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        Self {
            raw,
            normalized,
            words,
        }
    }
}

/// Strip `-`, `_` and whitespace so `School_of-Medicine` matches `schoolofmedicine`.
pub(crate) fn normalize_keyword(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(rename = "rule", default)]
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl Classifier {
    /// Build a classifier from rules evaluated in the given order.
    pub fn new(rules: Vec<Rule>) -> Result<Self, DownloaderError> {
        let rules = rules
            .into_iter()
            .map(Rule::canonical)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Parse a rules file:
    ///
    /// ```toml
    /// [[rule]]
    /// category = "pi_rankings"
    /// form = "raw"
    /// keywords = ["_pi_", "_pi."]
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, DownloaderError> {
        let file: RulesFile =
            toml::from_str(text).map_err(|e| DownloaderError::Rules(e.to_string()))?;
        if file.rules.is_empty() {
            return Err(DownloaderError::Rules("rules file defines no [[rule]] entries".into()));
        }
        Self::new(file.rules)
    }

    pub fn load(path: &Path) -> Result<Self, DownloaderError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, label: &str) -> Category {
        let forms = LabelForms::new(label);
        self.rules
            .iter()
            .find(|rule| rule.matches(&forms))
            .map(|rule| rule.category)
            .unwrap_or(Category::Other)
    }
}

/// Classify with the built-in rule set.
pub fn classify(label: &str) -> Category {
    static DEFAULT: OnceLock<Classifier> = OnceLock::new();
    DEFAULT.get_or_init(Classifier::default).classify(label)
}
