use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::card::CardRecord;
use crate::parser::keys::normalize;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]+").unwrap());

/// What a [`KeyFromText`] policy is naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Label,
    Heading,
}

pub type KeyFromText = Arc<dyn Fn(&str, KeySource) -> String + Send + Sync>;
/// `(source card, property key, markdown level) -> html level`
pub type HeaderMap = Arc<dyn Fn(&CardRecord, &str, u8) -> anyhow::Result<i32> + Send + Sync>;
/// `(source card, property key, heading plain text) -> id attribute`
pub type HeaderId = Arc<dyn Fn(&CardRecord, &str, &str) -> anyhow::Result<String> + Send + Sync>;
/// `(source card, property key, target card) -> href`. Empty means "no anchor".
pub type LinkTargetUrl =
    Arc<dyn Fn(&CardRecord, &str, &CardRecord) -> anyhow::Result<String> + Send + Sync>;

/// Conversion settings for [`crate::convert`].
#[derive(Clone)]
pub struct Options {
    /// Include archived lists and cards.
    pub get_archived: bool,
    /// Fetch the URL of each card's cover attachment.
    pub get_covers: bool,
    pub key_from_text: KeyFromText,
    pub header_map: HeaderMap,
    pub header_id: HeaderId,
    pub link_target_url: LinkTargetUrl,
    /// Fail the conversion when any warning was raised.
    pub strict_warnings: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            get_archived: false,
            get_covers: true,
            key_from_text: Arc::new(|text, _| normalize(text)),
            header_map: Arc::new(|_, _, level| Ok(i32::from(level) - 1)),
            header_id: Arc::new(|_, _, text| Ok(default_header_id(text))),
            link_target_url: Arc::new(|_, _, target| Ok(default_link_target_url(target))),
            strict_warnings: true,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("get_archived", &self.get_archived)
            .field("get_covers", &self.get_covers)
            .field("strict_warnings", &self.strict_warnings)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn with_key_from_text<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, KeySource) -> String + Send + Sync + 'static,
    {
        self.key_from_text = Arc::new(f);
        self
    }

    pub fn with_header_map<F>(mut self, f: F) -> Self
    where
        F: Fn(&CardRecord, &str, u8) -> anyhow::Result<i32> + Send + Sync + 'static,
    {
        self.header_map = Arc::new(f);
        self
    }

    pub fn with_header_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&CardRecord, &str, &str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.header_id = Arc::new(f);
        self
    }

    pub fn with_link_target_url<F>(mut self, f: F) -> Self
    where
        F: Fn(&CardRecord, &str, &CardRecord) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.link_target_url = Arc::new(f);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_warnings = strict;
        self
    }
}

/// Lowercase, non-word runs to `-`, one leading/trailing `-` dropped.
pub fn default_header_id(text: &str) -> String {
    let lower = text.to_lowercase();
    let id = NON_WORD_RE.replace_all(&lower, "-");
    let id = id.strip_suffix('-').unwrap_or(&id);
    let id = id.strip_prefix('-').unwrap_or(id);
    id.to_string()
}

pub fn default_link_target_url(target: &CardRecord) -> String {
    format!("#{}", target.id)
}
