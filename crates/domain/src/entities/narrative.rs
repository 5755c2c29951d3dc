//! Narrator node output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::origin::{Origin, Originated};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Raw,
    Processed,
    Cached,
    Error,
}

/// Section text produced by the narrator node, tagged with the node that
/// built it so the workflow's fan-in merge can tell it apart from a stale
/// or concurrently-produced candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub section_number: u32,
    pub content: String,
    pub source_type: SourceType,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub origin: Origin,
}

impl Narrative {
    pub fn processed(section_number: u32, content: String, now: DateTime<Utc>) -> Self {
        Self {
            section_number,
            content,
            source_type: SourceType::Processed,
            error: None,
            timestamp: now,
            origin: Origin::Narrator,
        }
    }

    pub fn error(section_number: u32, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            section_number,
            content: String::new(),
            source_type: SourceType::Error,
            error: Some(message.into()),
            timestamp: now,
            origin: Origin::Narrator,
        }
    }
}

impl Originated for Narrative {
    fn origin(&self) -> Origin {
        self.origin
    }
}
