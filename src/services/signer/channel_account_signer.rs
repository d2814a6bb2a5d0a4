use std::sync::Arc;

use async_trait::async_trait;
use soroban_rs::xdr::TransactionEnvelope;
use tracing::debug;

use super::{sign_with_key, signing_key_from_seed, StellarSignTrait};
use crate::models::SignerError;
use crate::repositories::ChannelAccountStore;
use crate::utils::FieldEncryption;

/// Signs with channel account seeds kept encrypted in the channel account store.
pub struct ChannelAccountDbSigner {
    store: Arc<dyn ChannelAccountStore>,
    encryption: Arc<FieldEncryption>,
}

impl ChannelAccountDbSigner {
    pub fn new(store: Arc<dyn ChannelAccountStore>, encryption: Arc<FieldEncryption>) -> Self {
        Self { store, encryption }
    }
}

#[async_trait]
impl StellarSignTrait for ChannelAccountDbSigner {
    async fn sign_envelope(
        &self,
        envelope: TransactionEnvelope,
        network_passphrase: &str,
        accounts: &[String],
    ) -> Result<TransactionEnvelope, SignerError> {
        if accounts.is_empty() {
            return Err(SignerError::Configuration(
                "at least one account is required to sign".to_string(),
            ));
        }

        let mut envelope = envelope;
        for public_key in accounts {
            let account = self.store.get(public_key).await.map_err(|e| {
                if e.is_not_found() {
                    SignerError::UnknownAccount(public_key.clone())
                } else {
                    SignerError::KeyError(format!(
                        "cannot load channel account {public_key}: {e}"
                    ))
                }
            })?;
            let encrypted = account
                .encrypted_private_key
                .as_ref()
                .ok_or_else(|| {
                    SignerError::KeyError(format!(
                        "channel account {public_key} has no private key"
                    ))
                })?;

            let seed = self
                .encryption
                .decrypt_seed(public_key, encrypted)
                .map_err(|e| SignerError::KeyError(e.to_string()))?;
            let signing_key = signing_key_from_seed(&seed)?;

            debug!(channel_account = %public_key, "signing with channel account");
            envelope = sign_with_key(envelope, network_passphrase, &signing_key)?;
        }
        Ok(envelope)
    }
}
