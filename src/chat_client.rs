//! Client for the chat-platform upload endpoints (Telegram Bot API-shaped).
//!
//! Calls are spaced rather than windowed: the chat API's own flood limits
//! are per-chat and much tighter than the search API's, so the Pipeline
//! inserts a fixed delay between sends instead of sharing the Fetcher's
//! [`RateLimiter`](crate::rate_limiter::RateLimiter).

use std::path::Path;

use serde::Deserialize;

use crate::error::ChatApiError;

const BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
}

/// One item of a media-group (album) upload.
pub struct MediaItem<'a> {
    pub path: &'a Path,
    pub thumbnail: Option<&'a Path>,
}

/// Telegram's `InputMedia` discriminant. The preview album is sent as
/// `photo` so clients render it inline; the HD follow-up is a `document`
/// send so the original file reaches the chat uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

impl MediaKind {
    fn as_api_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
        }
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    bot_token: String,
}

impl ChatClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("reqwest client builder never fails with this config"),
            bot_token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{BASE_URL}/bot{}/{method}", self.bot_token)
    }

    /// Sends an album of documents (with optional per-item thumbnail) to a
    /// chat in one request. Returns one [`Message`] per item, in order.
    pub async fn send_media_group(
        &self,
        chat_id: i64,
        items: &[MediaItem<'_>],
        kind: MediaKind,
    ) -> Result<Vec<Message>, ChatApiError> {
        let mut form = reqwest::multipart::Form::new().text("chat_id", chat_id.to_string());
        let mut media_json = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let file_key = format!("file{idx}");
            let bytes = tokio::fs::read(item.path)
                .await
                .map_err(|e| ChatApiError::Rejected(e.to_string()))?;
            let file_name = item
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_key.clone());
            form = form.part(
                file_key.clone(),
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
            let mut entry = serde_json::json!({
                "type": kind.as_api_str(),
                "media": format!("attach://{file_key}"),
            });
            if let Some(thumb) = item.thumbnail {
                let thumb_key = format!("thumb{idx}");
                let thumb_bytes = tokio::fs::read(thumb)
                    .await
                    .map_err(|e| ChatApiError::Rejected(e.to_string()))?;
                form = form.part(
                    thumb_key.clone(),
                    reqwest::multipart::Part::bytes(thumb_bytes).file_name(thumb_key.clone()),
                );
                entry["thumbnail"] = serde_json::json!(format!("attach://{thumb_key}"));
            }
            media_json.push(entry);
        }
        form = form.text("media", serde_json::to_string(&media_json).unwrap());

        let response = self
            .http
            .post(self.method_url("sendMediaGroup"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let envelope: ApiEnvelope<Vec<Message>> = response.json().await?;
        if !envelope.ok {
            return Err(ChatApiError::Rejected(
                envelope.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(envelope.result.unwrap_or_default())
    }

    /// Sends a single document with an optional thumbnail, used for the HD
    /// follow-up send after the preview album.
    pub async fn send_document(
        &self,
        chat_id: i64,
        document: &Path,
        thumbnail: Option<&Path>,
    ) -> Result<Message, ChatApiError> {
        let mut form = reqwest::multipart::Form::new().text("chat_id", chat_id.to_string());
        let doc_bytes = tokio::fs::read(document)
            .await
            .map_err(|e| ChatApiError::Rejected(e.to_string()))?;
        let doc_name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        form = form.part(
            "document",
            reqwest::multipart::Part::bytes(doc_bytes).file_name(doc_name),
        );
        if let Some(thumb) = thumbnail {
            let thumb_bytes = tokio::fs::read(thumb)
                .await
                .map_err(|e| ChatApiError::Rejected(e.to_string()))?;
            form = form.part(
                "thumbnail",
                reqwest::multipart::Part::bytes(thumb_bytes).file_name("thumb.jpg"),
            );
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let envelope: ApiEnvelope<Message> = response.json().await?;
        if !envelope.ok {
            return Err(ChatApiError::Rejected(
                envelope.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| ChatApiError::Rejected("missing result".into()))
    }
}
