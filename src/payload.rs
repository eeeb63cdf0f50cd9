//! Outbound message payloads.
//!
//! `Payload` is the closed set of message kinds the bot can emit. Every
//! consumer matches it exhaustively (no `_` arms), so a new variant does not
//! compile until validation, chat rendering and naming all handle it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::validation::{violations, FieldViolation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Text(TextPayload),
    Image(ImagePayload),
    Audio(AudioPayload),
    Video(VideoPayload),
    File(FilePayload),
    Card(CardPayload),
    Carousel(CarouselPayload),
    Location(LocationPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TextPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub title: String,
    #[validate(url)]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    #[validate(url)]
    pub audio_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoPayload {
    pub title: String,
    #[validate(url)]
    pub video_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub title: String,
    #[validate(url)]
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(nested)]
    pub actions: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CardAction {
    pub action: ActionKind,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Postback,
    Url,
    Say,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CarouselPayload {
    #[validate(nested)]
    pub cards: Vec<CardPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocationPayload {
    #[validate(range(min = -90.0, max = 90.0), custom(function = "finite"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0), custom(function = "finite"))]
    pub longitude: f64,
}

/// NaN slips through range checks and serializes as `null`.
fn finite(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new("finite").with_message("must be a finite number".into()))
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("{kind} payload failed validation: {}", join(.violations))]
    Invalid {
        kind: &'static str,
        violations: Vec<FieldViolation>,
    },
}

fn join(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(TextPayload { text: text.into() })
    }

    /// Wire name of the variant (the `type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Image(_) => "image",
            Payload::Audio(_) => "audio",
            Payload::Video(_) => "video",
            Payload::File(_) => "file",
            Payload::Card(_) => "card",
            Payload::Carousel(_) => "carousel",
            Payload::Location(_) => "location",
        }
    }

    /// Check the payload against its variant's schema.
    pub fn validate(&self) -> Result<(), PayloadError> {
        let result = match self {
            Payload::Text(p) => p.validate(),
            Payload::Image(p) => p.validate(),
            Payload::Audio(p) => p.validate(),
            Payload::Video(p) => p.validate(),
            Payload::File(p) => p.validate(),
            Payload::Card(p) => p.validate(),
            Payload::Carousel(p) => p.validate(),
            Payload::Location(p) => p.validate(),
        };
        result.map_err(|errors| PayloadError::Invalid {
            kind: self.kind(),
            violations: violations(&errors),
        })
    }

    /// Render the payload as a single chat line. Text passes through as-is;
    /// rich variants become a short description since chat only carries text.
    pub fn to_chat_text(&self) -> String {
        match self {
            Payload::Text(p) => p.text.clone(),
            Payload::Image(p) => format!("[image] {}: {}", p.title, p.image_url),
            Payload::Audio(p) => format!("[audio] {}", p.audio_url),
            Payload::Video(p) => format!("[video] {}: {}", p.title, p.video_url),
            Payload::File(p) => format!("[file] {}: {}", p.title, p.file_url),
            Payload::Card(p) => format!("[card] {}", describe_card(p)),
            Payload::Carousel(p) => {
                let cards = p
                    .cards
                    .iter()
                    .map(describe_card)
                    .collect::<Vec<_>>()
                    .join(" / ");
                format!("[carousel] {cards}")
            }
            Payload::Location(p) => format!("[location] {}, {}", p.latitude, p.longitude),
        }
    }
}

fn describe_card(card: &CardPayload) -> String {
    let mut out = card.title.clone();
    if let Some(subtitle) = card.subtitle.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(" - ");
        out.push_str(subtitle);
    }
    if !card.actions.is_empty() {
        let labels = card
            .actions
            .iter()
            .map(|a| a.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(" ({labels})"));
    }
    out
}
