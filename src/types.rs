//! Core types shared by the sources and the notification channel

use crate::utils::escape_html;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextFormat {
    #[default]
    Html,
    Plain,
}

impl TextFormat {
    /// Bot API `parse_mode` value
    pub fn parse_mode(&self) -> Option<&'static str> {
        match self {
            TextFormat::Html => Some("HTML"),
            TextFormat::Plain => None,
        }
    }
}

/// Existing channel post to forward instead of publishing the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRef {
    /// `@channel` or a numeric chat id
    pub from_chat: String,
    pub message_id: i64,
}

/// A message bound for a Telegram chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub chat_id: i64,
    /// Plain text; escaped on render
    pub title: String,
    /// Already formatted for `format`
    pub body: String,
    pub format: TextFormat,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub reply_to: Option<i64>,
    /// When set the post is forwarded and the text is only a fallback
    #[serde(default)]
    pub forward: Option<ForwardRef>,
}

impl Message {
    pub fn new(chat_id: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            chat_id,
            title: title.into(),
            body: body.into(),
            format: TextFormat::Html,
            image: None,
            images: Vec::new(),
            reply_to: None,
            forward: None,
        }
    }

    pub fn plain(mut self) -> Self {
        self.format = TextFormat::Plain;
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        self.images = urls;
        self
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn forward_of(mut self, from_chat: impl Into<String>, message_id: i64) -> Self {
        self.forward = Some(ForwardRef {
            from_chat: from_chat.into(),
            message_id,
        });
        self
    }

    /// All image URLs, single image first
    pub fn all_images(&self) -> Vec<String> {
        let mut all: Vec<String> = self.image.iter().cloned().collect();
        for url in &self.images {
            if !all.contains(url) {
                all.push(url.clone());
            }
        }
        all
    }

    pub fn render(&self) -> String {
        let title = match self.format {
            TextFormat::Html if !self.title.is_empty() => {
                format!("<b>{}</b>", escape_html(&self.title))
            }
            _ => self.title.clone(),
        };
        match (title.is_empty(), self.body.is_empty()) {
            (true, _) => self.body.clone(),
            (false, true) => title,
            (false, false) => format!("{}\n{}", title, self.body),
        }
    }

    /// Same content with markup dropped, used when Telegram rejects the HTML
    pub fn to_plain(&self) -> Self {
        let mut plain = self.clone();
        if self.format == TextFormat::Html {
            plain.body = strip_tags(&self.body);
        }
        plain.format = TextFormat::Plain;
        plain
    }
}

/// Remove tags and decode the entities produced by `escape_html`
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
