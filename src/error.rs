use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::card::CardRecord;

/// Fatal conditions. Any of these aborts the whole board conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Trello API request failed ({endpoint}): {source}")]
    ApiRequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Strict mode: every warning collected during the run.
    #[error("{} warning(s) generated during conversion of board", .0.len())]
    Warnings(Vec<Warning>),
}

/// A fenced code block that is not a valid structured-data literal.
#[derive(Debug, Error)]
pub enum StructuredDataError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("YAML value has no JSON representation: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    InvalidStructuredData,
    UnresolvedLinkTarget,
    InvalidHeaderLevel,
    PolicyFailed,
}

/// Where a warning was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarningContext {
    pub id: String,
    pub title: String,
    pub url: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl WarningContext {
    pub fn new(card: &CardRecord, key: &str) -> Self {
        Self {
            id: card.id.clone(),
            title: card.title.clone(),
            url: card.url(),
            key: key.to_string(),
            ..Default::default()
        }
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }
}

/// A recoverable condition. Collected in permissive mode, escalated to
/// [`ConvertError::Warnings`] in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub context: WarningContext,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>, context: WarningContext) -> Self {
        Self {
            kind,
            message: message.into(),
            context,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} (card \"{}\" {}, key `{}`",
            self.kind, self.message, self.context.title, self.context.url, self.context.key
        )?;
        if let Some(href) = &self.context.href {
            write!(f, ", href {}", href)?;
        }
        if let Some(level) = self.context.level {
            write!(f, ", level {}", level)?;
        }
        if let Some(text) = &self.context.text {
            write!(f, ", text \"{}\"", text)?;
        }
        write!(f, ")")
    }
}
