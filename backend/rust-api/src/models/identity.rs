use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

lazy_static! {
    pub static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9]{10,15}$").unwrap();
    pub static ref FINGERPRINT_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{8,128}$").unwrap();
}

/// Contact details a guest supplies instead of registering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GuestContact {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(regex(path = *PHONE_REGEX, message = "Invalid phone number"))]
    pub phone: String,
}

/// The acting principal of a request.
///
/// Payments and attempts are keyed by [`Identity::key`]. For guests the key is the device
/// fingerprint alone; contact details ride along but never decide who owns a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    User {
        user_id: String,
        display_name: Option<String>,
    },
    Guest {
        device_fingerprint: String,
        contact: Option<GuestContact>,
    },
}

impl Identity {
    pub fn key(&self) -> String {
        match self {
            Identity::User { user_id, .. } => format!("user:{}", user_id),
            Identity::Guest {
                device_fingerprint, ..
            } => format!("device:{}", device_fingerprint),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User { user_id, .. } => Some(user_id),
            Identity::Guest { .. } => None,
        }
    }

    pub fn device_fingerprint(&self) -> Option<&str> {
        match self {
            Identity::Guest {
                device_fingerprint, ..
            } => Some(device_fingerprint),
            Identity::User { .. } => None,
        }
    }

    pub fn contact(&self) -> Option<&GuestContact> {
        match self {
            Identity::Guest { contact, .. } => contact.as_ref(),
            Identity::User { .. } => None,
        }
    }

    /// Name shown on the leaderboard
    pub fn display_name(&self) -> Option<String> {
        match self {
            Identity::User { display_name, .. } => display_name.clone(),
            Identity::Guest { contact, .. } => contact.as_ref().map(|c| c.name.clone()),
        }
    }

    pub fn with_contact(self, contact: Option<GuestContact>) -> Self {
        match self {
            Identity::Guest {
                device_fingerprint,
                contact: existing,
            } => Identity::Guest {
                device_fingerprint,
                contact: contact.or(existing),
            },
            user => user,
        }
    }
}
