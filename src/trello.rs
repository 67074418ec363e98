use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConvertError;

pub const DEFAULT_API_URL: &str = "https://api.trello.com";

pub fn card_url(short_id: &str) -> String {
    format!("https://trello.com/c/{}", short_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    Open,
    All,
}

impl ListFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ListFilter::Open => "open",
            ListFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFilter {
    Visible,
    All,
}

impl CardFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            CardFilter::Visible => "visible",
            CardFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiList {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiLabel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCard {
    pub id: String,
    pub short_link: String,
    pub id_list: String,
    #[serde(default)]
    pub id_attachment_cover: Option<String>,
    pub name: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_complete: bool,
    #[serde(default)]
    pub id_labels: Vec<String>,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiAttachment {
    #[serde(default)]
    pub id: String,
    pub url: String,
}

/// Where board data comes from.
#[async_trait]
pub trait BoardSource: Send + Sync {
    async fn fetch_lists(&self, board_id: &str, filter: ListFilter)
        -> Result<Vec<ApiList>, ConvertError>;
    async fn fetch_labels(&self, board_id: &str) -> Result<Vec<ApiLabel>, ConvertError>;
    async fn fetch_cards(&self, board_id: &str, filter: CardFilter)
        -> Result<Vec<ApiCard>, ConvertError>;
    async fn fetch_attachment(
        &self,
        card_id: &str,
        attachment_id: &str,
    ) -> Result<ApiAttachment, ConvertError>;
}

/// Trello REST client. Credentials are passed through as query parameters.
#[derive(Debug, Clone)]
pub struct TrelloClient {
    client: Client,
    base_url: String,
    app_key: String,
    auth_token: String,
}

impl TrelloClient {
    pub fn new(app_key: &str, auth_token: &str) -> Self {
        Self::with_base_url(DEFAULT_API_URL, app_key, auth_token)
    }

    pub fn with_base_url(base_url: &str, app_key: &str, auth_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, fields: &str) -> Result<T, ConvertError> {
        let fail = |source| ConvertError::ApiRequestFailed {
            endpoint: endpoint.to_string(),
            source,
        };

        debug!("GET {}", endpoint);
        self.client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(&[
                ("key", self.app_key.as_str()),
                ("token", self.auth_token.as_str()),
                ("fields", fields),
            ])
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?
            .json::<T>()
            .await
            .map_err(fail)
    }
}

#[async_trait]
impl BoardSource for TrelloClient {
    async fn fetch_lists(
        &self,
        board_id: &str,
        filter: ListFilter,
    ) -> Result<Vec<ApiList>, ConvertError> {
        let endpoint = format!("/1/boards/{}/lists/{}", board_id, filter.as_str());
        self.get(&endpoint, "id,name").await
    }

    async fn fetch_labels(&self, board_id: &str) -> Result<Vec<ApiLabel>, ConvertError> {
        let endpoint = format!("/1/boards/{}/labels", board_id);
        self.get(&endpoint, "id,name,color").await
    }

    async fn fetch_cards(
        &self,
        board_id: &str,
        filter: CardFilter,
    ) -> Result<Vec<ApiCard>, ConvertError> {
        let endpoint = format!("/1/boards/{}/cards/{}", board_id, filter.as_str());
        self.get(
            &endpoint,
            "id,shortLink,idList,idAttachmentCover,name,due,dueComplete,idLabels,desc",
        )
        .await
    }

    async fn fetch_attachment(
        &self,
        card_id: &str,
        attachment_id: &str,
    ) -> Result<ApiAttachment, ConvertError> {
        let endpoint = format!("/1/cards/{}/attachments/{}", card_id, attachment_id);
        self.get(&endpoint, "id,url").await
    }
}
