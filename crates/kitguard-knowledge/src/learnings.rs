//! Append-only log of lessons learned while working on a project.
//!
//! Entries live in a markdown file so they stay readable by humans:
//!
//! ```text
//! <!-- LEARNING_START:code_style:1718000000000 -->
//! **Lesson:** Use early returns
//! **Context:** review of parser.rs
//! <!-- LEARNING_END -->
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use kitguard_core::{KitConfig, KitError};
use kitguard_logging::{LogEvent, Logger};

const START_MARKER: &str = "<!-- LEARNING_START:";
const END_MARKER: &str = "<!-- LEARNING_END -->";
const LESSON_PREFIX: &str = "**Lesson:** ";
const CONTEXT_PREFIX: &str = "**Context:** ";
const FILE_HEADER: &str = "# Learnings\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCategory {
    CodeStyle,
    Bug,
    Preference,
    Pattern,
    Other,
}

impl LearningCategory {
    pub const ALL: [LearningCategory; 5] = [
        Self::CodeStyle,
        Self::Bug,
        Self::Preference,
        Self::Pattern,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeStyle => "code_style",
            Self::Bug => "bug",
            Self::Preference => "preference",
            Self::Pattern => "pattern",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for LearningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningCategory {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                KitError::validation(
                    "category",
                    format!(
                        "'{}' is not one of code_style, bug, preference, pattern, other",
                        s
                    ),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub category: LearningCategory,
    pub lesson: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Learning {
    fn to_block(&self) -> String {
        let mut block = format!(
            "{}{}:{} -->\n{}{}\n",
            START_MARKER,
            self.category,
            self.recorded_at.timestamp_millis(),
            LESSON_PREFIX,
            self.lesson
        );
        if let Some(context) = &self.context {
            block.push_str(CONTEXT_PREFIX);
            block.push_str(context);
            block.push('\n');
        }
        block.push_str(END_MARKER);
        block.push('\n');
        block
    }
}

pub struct LearningStore {
    path: PathBuf,
    logger: Arc<Logger>,
}

impl LearningStore {
    pub fn new(config: &KitConfig, logger: Arc<Logger>) -> Self {
        Self {
            path: config.learnings_path(),
            logger,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(
        &self,
        category: LearningCategory,
        lesson: &str,
        context: Option<&str>,
    ) -> Result<Learning, KitError> {
        let lesson = lesson.trim();
        if lesson.is_empty() {
            return Err(KitError::validation("lesson", "must not be empty"));
        }
        check_text("lesson", lesson)?;
        let context = context.map(str::trim).filter(|c| !c.is_empty());
        if let Some(context) = context {
            check_text("context", context)?;
        }

        let learning = Learning {
            category,
            lesson: lesson.to_string(),
            context: context.map(String::from),
            recorded_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_new = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if is_new {
            file.write_all(FILE_HEADER.as_bytes())?;
        }
        file.write_all(format!("\n{}", learning.to_block()).as_bytes())?;

        debug!(category = %category, "Saved learning");
        self.logger.log(&LogEvent::LearningSaved {
            category: category.to_string(),
        });

        Ok(learning)
    }

    /// All learnings in file order, optionally restricted to one category.
    pub fn list(&self, category: Option<LearningCategory>) -> Result<Vec<Learning>, KitError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_learnings(&content)
            .into_iter()
            .filter(|l| category.map_or(true, |c| l.category == c))
            .collect())
    }
}

/// Lessons are single-line and may not contain the block markers.
fn check_text(field: &'static str, text: &str) -> Result<(), KitError> {
    if text.contains('\n') || text.contains('\r') {
        return Err(KitError::validation(field, "must be a single line"));
    }
    if text.contains(START_MARKER) || text.contains(END_MARKER) {
        return Err(KitError::validation(field, "must not contain learning markers"));
    }
    Ok(())
}

/// Parse every well-formed block. Blocks with an unknown category or
/// without a closing marker are skipped.
pub fn parse_learnings(content: &str) -> Vec<Learning> {
    let mut learnings = Vec::new();
    let mut current: Option<(LearningCategory, DateTime<Utc>, Vec<&str>)> = None;

    for line in content.lines() {
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix(START_MARKER) {
            current = parse_header(header).map(|(c, t)| (c, t, Vec::new()));
            continue;
        }
        if line == END_MARKER {
            if let Some((category, recorded_at, body)) = current.take() {
                if let Some(learning) = build_learning(category, recorded_at, &body) {
                    learnings.push(learning);
                }
            }
            continue;
        }
        if let Some((_, _, body)) = current.as_mut() {
            body.push(line);
        }
    }

    learnings
}

fn parse_header(header: &str) -> Option<(LearningCategory, DateTime<Utc>)> {
    let header = header.strip_suffix("-->")?.trim();
    let (category, millis) = header.rsplit_once(':')?;
    let category = category.parse().ok()?;
    let recorded_at = Utc
        .timestamp_millis_opt(millis.parse().ok()?)
        .single()?;
    Some((category, recorded_at))
}

fn build_learning(
    category: LearningCategory,
    recorded_at: DateTime<Utc>,
    body: &[&str],
) -> Option<Learning> {
    let mut lesson = None;
    let mut context = None;
    for line in body {
        if let Some(text) = line.strip_prefix(LESSON_PREFIX) {
            lesson = Some(text.to_string());
        } else if let Some(text) = line.strip_prefix(CONTEXT_PREFIX) {
            context = Some(text.to_string());
        }
    }

    Some(Learning {
        category,
        lesson: lesson?,
        context,
        recorded_at,
    })
}
