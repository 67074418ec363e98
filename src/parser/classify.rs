use serde_json::Value;

use super::tokens::{TokenKind, TokenSequence};
use crate::error::StructuredDataError;

/// How a property body is stored.
#[derive(Debug)]
pub enum Classified {
    /// A lone fenced code block that parsed as YAML.
    Structured(Value),
    /// A lone fenced code block that did not.
    InvalidStructured(StructuredDataError),
    /// Anything else, rendered in the second pass.
    RichText(TokenSequence),
}

pub fn classify(body: TokenSequence) -> Classified {
    match body.tokens() {
        [token] => match &token.kind {
            TokenKind::Code {
                fenced: true, text, ..
            } => match parse_structured(text) {
                Ok(value) => Classified::Structured(value),
                Err(e) => Classified::InvalidStructured(e),
            },
            _ => Classified::RichText(body),
        },
        _ => Classified::RichText(body),
    }
}

/// Parse a YAML literal into a JSON value. Non-string mapping keys are
/// stringified on the way.
pub fn parse_structured(text: &str) -> Result<Value, StructuredDataError> {
    let yaml: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)?;
    Ok(serde_json::to_value(yaml)?)
}
