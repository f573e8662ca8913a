//! Messaging channels and the deep links that drive them.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::identity::is_valid_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    WhatsApp,
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms => write!(f, "SMS"),
            Self::WhatsApp => write!(f, "WhatsApp"),
            Self::Email => write!(f, "Email"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("{0} is not available on this device")]
    Unavailable(Channel),

    #[error("{channel} cannot reach {target:?}")]
    InvalidTarget { channel: Channel, target: String },

    #[error("{channel} send failed: {reason}")]
    Failed { channel: Channel, reason: String },
}

impl ChannelError {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Unavailable(channel) => *channel,
            Self::InvalidTarget { channel, .. } | Self::Failed { channel, .. } => *channel,
        }
    }
}

/// Why the platform could not open a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("no app handles this link")]
    NoHandler,

    #[error("{0}")]
    Failed(String),
}

/// The platform SMS composer. One call covers every recipient.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn send_batch(&self, recipients: &[String], body: &str) -> Result<(), ChannelError>;
}

/// Hands a URL to whichever installed app claims its scheme.
#[async_trait]
pub trait LinkOpener: Send + Sync {
    async fn open(&self, url: &Url) -> Result<(), OpenError>;
}

pub type DynSmsGateway = Arc<dyn SmsGateway>;
pub type DynLinkOpener = Arc<dyn LinkOpener>;

/// Digits of a dialable international number, or `None` when `raw` cannot be
/// one. Spaces, dashes, dots and parentheses are ignored; a `+` may only lead.
pub fn dialable_digits(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let body = raw.strip_prefix('+').unwrap_or(raw);

    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    (7..=15).contains(&digits.len()).then_some(digits)
}

pub fn whatsapp_link(identifier: &str, message: &str) -> Result<Url, ChannelError> {
    let invalid = || ChannelError::InvalidTarget {
        channel: Channel::WhatsApp,
        target: identifier.to_string(),
    };
    let phone = dialable_digits(identifier).ok_or_else(invalid)?;

    Url::parse(&format!(
        "whatsapp://send?phone={}&text={}",
        phone,
        urlencoding::encode(message)
    ))
    .map_err(|_| invalid())
}

pub fn mailto_link(address: &str, subject: &str, body: &str) -> Result<Url, ChannelError> {
    let address = address.trim();
    let invalid = || ChannelError::InvalidTarget {
        channel: Channel::Email,
        target: address.to_string(),
    };
    if !is_valid_email(address) {
        return Err(invalid());
    }

    Url::parse(&format!(
        "mailto:{}?subject={}&body={}",
        address,
        urlencoding::encode(subject),
        urlencoding::encode(body)
    ))
    .map_err(|_| invalid())
}
