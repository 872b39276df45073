//! Lookup of user ids from email addresses.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::SlurpError;

/// Resolves collaborator emails to the opaque uids stored on trips.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Email of the signed-in user.
    async fn current_user_email(&self) -> Result<String, SlurpError>;

    async fn uid_for_email(&self, email: &str) -> Result<String, SlurpError>;

    async fn current_user_uid(&self) -> Result<String, SlurpError> {
        let email = self.current_user_email().await?;
        self.uid_for_email(&email).await
    }
}

/// Fixed email to uid table. Emails are matched case-insensitively.
#[derive(Clone, Debug)]
pub struct InMemoryDirectory {
    current_user_email: String,
    uids: HashMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new(current_user_email: &str, current_user_uid: &str) -> Self {
        let mut uids = HashMap::new();
        uids.insert(
            current_user_email.to_lowercase(),
            current_user_uid.to_string(),
        );
        Self {
            current_user_email: current_user_email.to_string(),
            uids,
        }
    }

    pub fn with_user(mut self, email: &str, uid: &str) -> Self {
        self.uids.insert(email.to_lowercase(), uid.to_string());
        self
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn current_user_email(&self) -> Result<String, SlurpError> {
        Ok(self.current_user_email.clone())
    }

    async fn uid_for_email(&self, email: &str) -> Result<String, SlurpError> {
        self.uids
            .get(&email.to_lowercase())
            .cloned()
            .ok_or_else(|| SlurpError::InvalidInput(format!("no user registered for {email}")))
    }
}
