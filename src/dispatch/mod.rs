//! SOS fan-out.
//!
//! One alert goes out over every channel each contact has: a single batch SMS
//! for all phone numbers, plus one WhatsApp and one email deep link per
//! contact. Attempts run concurrently and are all settled; one failing channel
//! never stops the others.

pub mod channels;
pub mod location;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use url::Url;

use crate::config::{DispatchConfig, LocationPolicy};
use crate::contacts::Contact;
use crate::error::AppError;
use channels::{mailto_link, whatsapp_link, Channel, ChannelError, DynLinkOpener, DynSmsGateway, OpenError};
use location::{read_position, Coordinates, DynLocationProvider, PermissionStatus};

pub use channels::{LinkOpener, SmsGateway};
pub use location::LocationProvider;

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Nothing was sent: the contact list was empty.
    NoContacts,
    /// Nothing was sent: location was refused under the strict policy.
    PermissionDenied,
    Dispatched(DispatchReport),
}

impl DispatchOutcome {
    /// Error category to surface to the user, if any.
    pub fn error(&self) -> Option<AppError> {
        match self {
            Self::NoContacts => Some(AppError::Validation(
                "Add an emergency contact before sending an SOS".into(),
            )),
            Self::PermissionDenied => Some(AppError::PermissionDenied),
            Self::Dispatched(report) if report.failures().next().is_some() => {
                Some(AppError::ChannelUnavailable)
            }
            Self::Dispatched(_) => None,
        }
    }

    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::Dispatched(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelAttempt {
    pub channel: Channel,
    /// Phone numbers for the SMS batch, otherwise the contact's name.
    pub target: String,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<(), ChannelError>,
}

fn serialize_result<S: serde::Serializer>(
    result: &Result<(), ChannelError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match result {
        Ok(()) => serializer.serialize_none(),
        Err(e) => serializer.serialize_some(&e.to_string()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub location: Option<Coordinates>,
    pub sms_recipients: Vec<String>,
    pub attempts: Vec<ChannelAttempt>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ChannelAttempt> {
        self.attempts.iter().filter(|a| a.result.is_err())
    }

    pub fn delivered(&self) -> usize {
        self.attempts.iter().filter(|a| a.result.is_ok()).count()
    }

    /// One message summarizing what went wrong, `None` when every attempt
    /// succeeded.
    pub fn notice(&self) -> Option<String> {
        let failed: Vec<String> = self
            .failures()
            .map(|a| match &a.result {
                Err(e) => format!("{} ({})", a.target, e),
                Ok(()) => a.target.clone(),
            })
            .collect();

        if failed.is_empty() {
            None
        } else if self.delivered() == 0 {
            Some(format!("SOS could not be sent: {}", failed.join("; ")))
        } else {
            Some(format!(
                "SOS sent, but some alerts failed: {}",
                failed.join("; ")
            ))
        }
    }
}

enum Fix {
    Acquired(Coordinates),
    Denied,
    Unavailable,
}

pub struct DispatchEngine {
    location: DynLocationProvider,
    sms: DynSmsGateway,
    links: DynLinkOpener,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        location: DynLocationProvider,
        sms: DynSmsGateway,
        links: DynLinkOpener,
        config: DispatchConfig,
    ) -> Self {
        Self {
            location,
            sms,
            links,
            config,
        }
    }

    pub async fn send_sos(&self, contacts: &[Contact]) -> DispatchOutcome {
        if contacts.is_empty() {
            tracing::info!("SOS requested with no emergency contacts");
            return DispatchOutcome::NoContacts;
        }

        let location = match self.locate().await {
            Fix::Acquired(coords) => Some(coords),
            Fix::Denied if self.config.location_policy == LocationPolicy::Strict => {
                tracing::warn!("Location denied, SOS aborted under strict policy");
                return DispatchOutcome::PermissionDenied;
            }
            Fix::Denied | Fix::Unavailable => None,
        };

        let message = self.compose_message(location);
        let sms_recipients: Vec<String> = contacts
            .iter()
            .filter_map(|c| c.phone.clone())
            .collect();

        let mut pending: Vec<BoxFuture<'_, ChannelAttempt>> = Vec::new();
        if !sms_recipients.is_empty() {
            pending.push(self.send_sms(&sms_recipients, &message).boxed());
        }
        for contact in contacts {
            if let Some(ref number) = contact.whatsapp {
                pending.push(self.open_whatsapp(contact, number, &message).boxed());
            }
            if let Some(ref address) = contact.email {
                pending.push(self.open_email(contact, address, &message).boxed());
            }
        }

        let attempts = join_all(pending).await;
        for attempt in &attempts {
            if let Err(ref e) = attempt.result {
                tracing::warn!("SOS via {} to {} failed: {}", attempt.channel, attempt.target, e);
            }
        }

        let report = DispatchReport {
            location,
            sms_recipients,
            attempts,
        };
        tracing::info!(
            "SOS dispatched: {}/{} attempts delivered, location attached: {}",
            report.delivered(),
            report.attempts.len(),
            report.location.is_some()
        );
        DispatchOutcome::Dispatched(report)
    }

    async fn locate(&self) -> Fix {
        let limit = self.config.location_timeout();
        match tokio::time::timeout(limit, self.location.request_permission()).await {
            Ok(PermissionStatus::Granted) => {}
            Ok(PermissionStatus::Denied) => return Fix::Denied,
            Err(_) => {
                tracing::warn!(
                    "Permission prompt unanswered after {:?}, sending SOS without location",
                    limit
                );
                return Fix::Unavailable;
            }
        }
        match read_position(self.location.as_ref(), limit).await {
            Ok(coords) => Fix::Acquired(coords),
            Err(e) => {
                tracing::warn!("Sending SOS without location: {}", e);
                Fix::Unavailable
            }
        }
    }

    fn compose_message(&self, location: Option<Coordinates>) -> String {
        match location {
            Some(c) => format!(
                "{}\nLocation: {}?q={},{}",
                self.config.preamble, self.config.maps_base_url, c.latitude, c.longitude
            ),
            None => self.config.preamble.clone(),
        }
    }

    async fn send_sms(&self, recipients: &[String], message: &str) -> ChannelAttempt {
        let result = if self.sms.is_available().await {
            self.sms.send_batch(recipients, message).await
        } else {
            Err(ChannelError::Unavailable(Channel::Sms))
        };
        ChannelAttempt {
            channel: Channel::Sms,
            target: recipients.join(", "),
            result,
        }
    }

    async fn open_whatsapp(&self, contact: &Contact, number: &str, message: &str) -> ChannelAttempt {
        let result = match whatsapp_link(number, message) {
            Ok(url) => self.open(Channel::WhatsApp, &url).await,
            Err(e) => Err(e),
        };
        ChannelAttempt {
            channel: Channel::WhatsApp,
            target: contact.name.clone(),
            result,
        }
    }

    async fn open_email(&self, contact: &Contact, address: &str, message: &str) -> ChannelAttempt {
        let result = match mailto_link(address, &self.config.email_subject, message) {
            Ok(url) => self.open(Channel::Email, &url).await,
            Err(e) => Err(e),
        };
        ChannelAttempt {
            channel: Channel::Email,
            target: contact.name.clone(),
            result,
        }
    }

    async fn open(&self, channel: Channel, url: &Url) -> Result<(), ChannelError> {
        self.links.open(url).await.map_err(|e| match e {
            OpenError::NoHandler => ChannelError::Unavailable(channel),
            OpenError::Failed(reason) => ChannelError::Failed { channel, reason },
        })
    }
}
