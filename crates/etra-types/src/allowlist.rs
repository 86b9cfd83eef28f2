use serde::{Deserialize, Serialize};

/// One of the two people allowed into the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    pub name: String,
}

impl Participant {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into().to_lowercase(),
            name: name.into(),
        }
    }
}

/// Fixed allow-list of exactly two identities.
///
/// Checked before any credentials are sent to the auth service. Emails are
/// compared case-insensitively and are never trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    participants: [Participant; 2],
}

impl AllowList {
    pub fn new(first: Participant, second: Participant) -> Self {
        Self {
            participants: [first, second],
        }
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    pub fn is_allowed_email(&self, email: &str) -> bool {
        self.find(email).is_some()
    }

    /// Display name for an email, falling back to the local part for
    /// addresses that are not on the list.
    pub fn display_name(&self, email: &str) -> String {
        match self.find(email) {
            Some(p) => p.name.clone(),
            None => email.split('@').next().unwrap_or_default().to_string(),
        }
    }

    /// Display name of the other participant, as seen from `email`.
    pub fn other_display_name(&self, email: &str) -> String {
        self.other(email).name.clone()
    }

    /// The participant that is not `email`. An unknown email resolves to the
    /// first entry, since in a two-person app anybody else is "not them".
    pub fn other(&self, email: &str) -> &Participant {
        let lower = email.to_lowercase();
        if self.participants[0].email == lower {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }

    fn find(&self, email: &str) -> Option<&Participant> {
        let lower = email.to_lowercase();
        self.participants.iter().find(|p| p.email == lower)
    }
}
