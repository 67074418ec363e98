use std::collections::HashMap;

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::card::{CardRecord, PropertyValue, DESCRIPTION_KEY};
use crate::error::{ConvertError, Warning, WarningContext, WarningKind};
use crate::options::{KeySource, Options};
use crate::parser::classify::Classified;
use crate::parser::extract_properties;
use crate::parser::tokens::TokenSequence;
use crate::render::CardRenderer;
use crate::trello::{ApiCard, ApiLabel, BoardSource, CardFilter, ListFilter, TrelloClient};

/// A card during the run: its record plus the rich-text blocks that still
/// need rendering.
#[derive(Debug, Clone)]
pub struct CardEntry {
    pub record: CardRecord,
    pub pending: IndexMap<String, TokenSequence>,
}

impl CardEntry {
    pub fn new(record: CardRecord) -> Self {
        Self {
            record,
            pending: IndexMap::new(),
        }
    }
}

/// Short id → card, in fetch order. Complete after the first pass; only read
/// during the second.
#[derive(Debug, Default)]
pub struct CardIndex {
    cards: IndexMap<String, CardEntry>,
}

impl CardIndex {
    pub fn insert(&mut self, entry: CardEntry) {
        self.cards.insert(entry.record.short_id.clone(), entry);
    }

    pub fn get(&self, short_id: &str) -> Option<&CardRecord> {
        self.cards.get(short_id).map(|entry| &entry.record)
    }

    pub fn get_mut(&mut self, short_id: &str) -> Option<&mut CardEntry> {
        self.cards.get_mut(short_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CardEntry> {
        self.cards.values()
    }

    pub fn into_records(self) -> Vec<CardRecord> {
        self.cards.into_values().map(|entry| entry.record).collect()
    }
}

/// A board label with its output name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

impl Label {
    /// Named labels go through the key policy; unnamed ones fall back to their color.
    pub fn from_api(label: ApiLabel, options: &Options) -> Self {
        let name = if label.name.is_empty() {
            label.color.unwrap_or_else(|| "_".to_string())
        } else {
            (options.key_from_text)(&label.name, KeySource::Label)
        };
        Self { id: label.id, name }
    }
}

#[derive(Debug, Default)]
pub struct Conversion {
    pub cards: Vec<CardRecord>,
    pub warnings: Vec<Warning>,
}

/// Convert a board through the Trello REST API.
pub async fn convert(
    app_key: &str,
    auth_token: &str,
    board_id: &str,
    options: &Options,
) -> Result<Conversion, ConvertError> {
    let client = TrelloClient::new(app_key, auth_token);
    convert_board(&client, board_id, options).await
}

/// Fetch, assemble every card, fetch covers, then render. Rendering waits
/// for the whole index so links can point at any card of the board.
pub async fn convert_board<S: BoardSource + ?Sized>(
    source: &S,
    board_id: &str,
    options: &Options,
) -> Result<Conversion, ConvertError> {
    let (list_filter, card_filter) = if options.get_archived {
        (ListFilter::All, CardFilter::All)
    } else {
        (ListFilter::Open, CardFilter::Visible)
    };

    let (lists, labels, cards) = tokio::try_join!(
        source.fetch_lists(board_id, list_filter),
        source.fetch_labels(board_id),
        source.fetch_cards(board_id, card_filter),
    )?;
    info!(
        "Fetched board {}: {} lists, {} labels, {} cards",
        board_id,
        lists.len(),
        labels.len(),
        cards.len()
    );

    let lists: HashMap<String, String> = lists.into_iter().map(|l| (l.id, l.name)).collect();
    let labels: Vec<Label> = labels
        .into_iter()
        .map(|l| Label::from_api(l, options))
        .collect();

    // Pass one: every card gets its base record and its pending blocks.
    let mut index = CardIndex::default();
    let mut warnings = Vec::new();
    for card in &cards {
        assemble_card(card, &lists, &labels, options, &mut index, &mut warnings);
    }

    let covers: Vec<&ApiCard> = if options.get_covers {
        cards
            .iter()
            .filter(|card| card.id_attachment_cover.is_some())
            .collect()
    } else {
        Vec::new()
    };
    if !covers.is_empty() {
        info!("Fetching {} cover attachments", covers.len());
    }
    let fetched = try_join_all(covers.into_iter().map(|card| async move {
        let attachment_id = card.id_attachment_cover.as_deref().unwrap_or_default();
        let attachment = source.fetch_attachment(&card.id, attachment_id).await?;
        Ok::<_, ConvertError>((card.short_link.as_str(), attachment.url))
    }))
    .await?;
    for (short_id, url) in fetched {
        if let Some(entry) = index.get_mut(short_id) {
            entry.record.cover = Some(url);
        }
    }

    // Pass two: the index is complete, render every pending block.
    let rendered = render_pending(&index, options, &mut warnings);
    for (short_id, key, html) in rendered {
        if let Some(entry) = index.get_mut(&short_id) {
            entry.record.properties.insert(key, PropertyValue::Html(html));
        }
    }

    if options.strict_warnings && !warnings.is_empty() {
        return Err(ConvertError::Warnings(warnings));
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    let cards = index.into_records();
    info!("Converted {} cards ({} warnings)", cards.len(), warnings.len());
    Ok(Conversion { cards, warnings })
}

/// Build a card's base record, segment its description and store either a
/// resolved value or a pending block per key.
pub fn assemble_card(
    card: &ApiCard,
    lists: &HashMap<String, String>,
    labels: &[Label],
    options: &Options,
    index: &mut CardIndex,
    warnings: &mut Vec<Warning>,
) {
    let mut entry = CardEntry::new(CardRecord::new(&card.id, &card.short_link, &card.name));
    let record = &mut entry.record;
    record.list = lists.get(&card.id_list).cloned();
    if let Some(due) = card.due {
        record.date = Some(due);
        record.draft = !card.due_complete;
    }
    for label in labels {
        record
            .labels
            .insert(label.name.clone(), card.id_labels.contains(&label.id));
    }

    let extraction = extract_properties(&card.desc, options);
    record
        .properties
        .insert(DESCRIPTION_KEY.to_string(), PropertyValue::Pending);
    entry
        .pending
        .insert(DESCRIPTION_KEY.to_string(), extraction.description);

    for property in extraction.properties {
        let key = property.key;
        let value = match property.value {
            Classified::Structured(value) => PropertyValue::Data(value),
            Classified::InvalidStructured(e) => {
                warnings.push(Warning::new(
                    WarningKind::InvalidStructuredData,
                    e.to_string(),
                    WarningContext::new(&entry.record, &key),
                ));
                PropertyValue::Data(Value::Null)
            }
            Classified::RichText(body) => {
                entry.pending.insert(key.clone(), body);
                entry.record.properties.insert(key, PropertyValue::Pending);
                continue;
            }
        };
        entry.pending.shift_remove(&key);
        entry.record.properties.insert(key, value);
    }

    debug!(
        "Assembled card {} ({} properties, {} pending)",
        card.short_link,
        entry.record.properties.len(),
        entry.pending.len()
    );
    index.insert(entry);
}

fn render_pending(
    index: &CardIndex,
    options: &Options,
    warnings: &mut Vec<Warning>,
) -> Vec<(String, String, String)> {
    let mut rendered = Vec::new();
    for entry in index.entries() {
        for (key, block) in &entry.pending {
            let out = CardRenderer::new(&entry.record, key, index, options).render(block);
            warnings.extend(out.warnings);
            rendered.push((entry.record.short_id.clone(), key.clone(), out.html));
        }
    }
    rendered
}

// ── Tests ──
