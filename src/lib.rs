//! Convert a Trello board into one flat record per card.
//!
//! A card's description is split at its top-level headings: the text before
//! the first heading stays the description, every heading names a property.
//! A property whose body is a single fenced code block is parsed as YAML;
//! anything else is rendered to HTML once the whole board is known, so links
//! to other cards can be rewritten.

pub mod board;
pub mod card;
pub mod error;
pub mod options;
pub mod parser;
pub mod render;
pub mod trello;

pub use board::{convert, convert_board, Conversion};
pub use card::{CardRecord, PropertyValue};
pub use error::{ConvertError, Warning, WarningKind};
pub use options::{KeySource, Options};
pub use trello::{BoardSource, TrelloClient};
