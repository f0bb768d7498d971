//! Message payload and identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dispatch::DispatchError;

/// Outbound message. Opaque to the dispatcher apart from identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "to")]
    pub recipient: String,
    #[serde(alias = "from")]
    pub sender: String,
    pub subject: String,
    #[serde(alias = "message")]
    pub body: String,
}

impl Message {
    pub fn new(
        recipient: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Names of fields that are empty or whitespace.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("recipient", &self.recipient),
            ("sender", &self.sender),
            ("subject", &self.subject),
            ("body", &self.body),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Stable message identifier: an idempotency key or a content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub const MAX_KEY_LENGTH: usize = 256;

    /// Identifier from a caller-supplied idempotency key (trimmed).
    pub fn from_key(key: &str) -> Result<Self, DispatchError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DispatchError::InvalidIdempotencyKey("key cannot be empty".into()));
        }
        if key.len() > Self::MAX_KEY_LENGTH {
            return Err(DispatchError::InvalidIdempotencyKey(format!(
                "key exceeds {} bytes",
                Self::MAX_KEY_LENGTH
            )));
        }
        Ok(Self(key.to_string()))
    }

    /// SHA-256 of the message fields, hex encoded.
    ///
    /// Each field is length-prefixed so that shifting text between fields
    /// changes the digest.
    pub fn digest(message: &Message) -> Self {
        let mut hasher = Sha256::new();
        for field in [&message.recipient, &message.sender, &message.subject, &message.body] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Key if supplied, digest otherwise.
    pub fn resolve(message: &Message, key: Option<&str>) -> Result<Self, DispatchError> {
        match key {
            Some(key) => Self::from_key(key),
            None => Ok(Self::digest(message)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
