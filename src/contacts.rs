use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Someone to alert during an SOS. At least one channel is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
}

/// Raw form values for a contact.
#[derive(Debug, Clone, Default)]
pub struct ContactInput {
    pub name: String,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
}

struct CleanContact {
    name: String,
    phone: Option<String>,
    whatsapp: Option<String>,
    email: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ContactInput {
    fn validate(self) -> AppResult<CleanContact> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Contact name is required".into()));
        }

        let contact = CleanContact {
            name,
            phone: clean(self.phone),
            whatsapp: clean(self.whatsapp),
            email: clean(self.email),
        };
        if contact.phone.is_none() && contact.whatsapp.is_none() && contact.email.is_none() {
            return Err(AppError::Validation(
                "Add a phone number, WhatsApp number or email".into(),
            ));
        }
        Ok(contact)
    }
}

/// Emergency contacts of the current session, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ContactStore {
    contacts: Vec<Contact>,
}

impl ContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a previously persisted list as-is.
    pub fn from_contacts(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn add(&mut self, input: ContactInput) -> AppResult<ContactId> {
        let clean = input.validate()?;
        let id = ContactId::generate();
        self.contacts.push(Contact {
            id: id.clone(),
            name: clean.name,
            phone: clean.phone,
            whatsapp: clean.whatsapp,
            email: clean.email,
        });
        tracing::debug!("Added emergency contact {}", id);
        Ok(id)
    }

    pub fn update(&mut self, id: &ContactId, input: ContactInput) -> AppResult<()> {
        let clean = input.validate()?;
        let contact = self
            .contacts
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or(AppError::NotFound)?;

        contact.name = clean.name;
        contact.phone = clean.phone;
        contact.whatsapp = clean.whatsapp;
        contact.email = clean.email;
        Ok(())
    }

    pub fn remove(&mut self, id: &ContactId) -> AppResult<Contact> {
        let pos = self
            .contacts
            .iter()
            .position(|c| &c.id == id)
            .ok_or(AppError::NotFound)?;
        Ok(self.contacts.remove(pos))
    }

    pub fn get(&self, id: &ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    pub fn list(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Contacts belong to a session; logout empties the store.
    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}
