use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::is_locked_at;
use crate::utils::EncryptedData;

/// Keypair used only to source the sequence number of inner transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub public_key: String,
    /// Secret seed sealed with the channel account encryption key.
    pub encrypted_private_key: Option<EncryptedData>,
    pub locked_until_ledger_number: Option<u32>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelAccount {
    pub fn new(public_key: &str, encrypted_private_key: Option<EncryptedData>) -> Self {
        let now = Utc::now();
        Self {
            public_key: public_key.to_string(),
            encrypted_private_key,
            locked_until_ledger_number: None,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked(&self, current_ledger_number: u32) -> bool {
        is_locked_at(self.locked_until_ledger_number, current_ledger_number)
    }
}
