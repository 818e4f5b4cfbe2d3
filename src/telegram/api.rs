//! Minimal Telegram Bot API client

use crate::error::{BotError, Result};
use crate::types::TextFormat;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Telegram error description for rejected markup
const PARSE_ERROR_MARKER: &str = "can't parse entities";

pub fn is_parse_error(err: &BotError) -> bool {
    matches!(err, BotError::Telegram(desc) if desc.contains(PARSE_ERROR_MARKER))
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub is_automatic_forward: bool,
    pub forward_origin: Option<ForwardOrigin>,
}

impl TgMessage {
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

/// Origin of a forwarded message (`channel`, `user`, ...)
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardOrigin {
    #[serde(rename = "type")]
    pub kind: String,
    pub chat: Option<Chat>,
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub command: String,
    pub description: String,
}

#[derive(Clone)]
pub struct BotApi {
    http: Client,
    base: String,
}

impl BotApi {
    pub fn new(http: Client, api_url: &str, token: &str) -> Self {
        Self {
            http,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let parsed: ApiResponse<T> = response.json().await?;
        if !parsed.ok {
            return Err(BotError::Telegram(format!(
                "{} failed ({}): {}",
                method,
                parsed.error_code.unwrap_or_default(),
                parsed.description.unwrap_or_default()
            )));
        }
        parsed
            .result
            .ok_or_else(|| BotError::Telegram(format!("{} returned no result", method)))
    }

    fn base_body(chat_id: i64, format: TextFormat, reply_to: Option<i64>) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("chat_id".into(), json!(chat_id));
        if let Some(mode) = format.parse_mode() {
            body.insert("parse_mode".into(), json!(mode));
        }
        if let Some(id) = reply_to {
            body.insert(
                "reply_parameters".into(),
                json!({ "message_id": id, "allow_sending_without_reply": true }),
            );
        }
        body
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        let response = self
            .http
            .post(format!("{}/getUpdates", self.base))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&body)
            .send()
            .await?;
        Self::unwrap_response("getUpdates", response).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i64>,
    ) -> Result<TgMessage> {
        let mut body = Self::base_body(chat_id, format, reply_to);
        body.insert("text".into(), json!(text));
        body.insert("link_preview_options".into(), json!({ "is_disabled": true }));
        self.call("sendMessage", &Value::Object(body)).await
    }

    pub async fn send_photo_url(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        format: TextFormat,
        reply_to: Option<i64>,
    ) -> Result<TgMessage> {
        let mut body = Self::base_body(chat_id, format, reply_to);
        body.insert("photo".into(), json!(photo_url));
        body.insert("caption".into(), json!(caption));
        self.call("sendPhoto", &Value::Object(body)).await
    }

    /// Upload raw image bytes as multipart
    pub async fn send_photo_bytes(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        caption: &str,
        format: TextFormat,
        reply_to: Option<i64>,
    ) -> Result<TgMessage> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name("photo.jpg");
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);
        if let Some(mode) = format.parse_mode() {
            form = form.text("parse_mode", mode);
        }
        if let Some(id) = reply_to {
            form = form.text("reply_to_message_id", id.to_string());
        }

        let response = self
            .http
            .post(format!("{}/sendPhoto", self.base))
            .multipart(form)
            .send()
            .await?;
        Self::unwrap_response("sendPhoto", response).await
    }

    /// Album of photos, caption attached to the first one
    pub async fn send_media_group(
        &self,
        chat_id: i64,
        photo_urls: &[String],
        caption: &str,
        format: TextFormat,
        reply_to: Option<i64>,
    ) -> Result<Vec<TgMessage>> {
        let media: Vec<Value> = photo_urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let mut item = json!({ "type": "photo", "media": url });
                if i == 0 {
                    item["caption"] = json!(caption);
                    if let Some(mode) = format.parse_mode() {
                        item["parse_mode"] = json!(mode);
                    }
                }
                item
            })
            .collect();

        let mut body = Self::base_body(chat_id, TextFormat::Plain, reply_to);
        body.insert("media".into(), Value::Array(media));
        self.call("sendMediaGroup", &Value::Object(body)).await
    }

    /// `from_chat` is a numeric id or `@channelname`
    pub async fn forward_message(
        &self,
        chat_id: i64,
        from_chat: &str,
        message_id: i64,
    ) -> Result<TgMessage> {
        let body = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat,
            "message_id": message_id,
        });
        self.call("forwardMessage", &body).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        format: TextFormat,
    ) -> Result<Value> {
        let mut body = Self::base_body(chat_id, format, None);
        body.insert("message_id".into(), json!(message_id));
        body.insert("text".into(), json!(text));
        body.insert("link_preview_options".into(), json!({ "is_disabled": true }));
        self.call("editMessageText", &Value::Object(body)).await
    }

    pub async fn edit_message_caption(
        &self,
        chat_id: i64,
        message_id: i64,
        caption: &str,
        format: TextFormat,
    ) -> Result<Value> {
        let mut body = Self::base_body(chat_id, format, None);
        body.insert("message_id".into(), json!(message_id));
        body.insert("caption".into(), json!(caption));
        self.call("editMessageCaption", &Value::Object(body)).await
    }

    pub async fn set_my_commands(&self, commands: &[CommandInfo]) -> Result<bool> {
        self.call("setMyCommands", &json!({ "commands": commands })).await
    }

    pub async fn get_my_commands(&self) -> Result<Vec<CommandInfo>> {
        self.call("getMyCommands", &json!({})).await
    }
}
