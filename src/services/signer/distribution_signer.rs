use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use soroban_rs::xdr::TransactionEnvelope;

use super::{account_address, sign_with_key, signing_key_from_seed, StellarSignTrait};
use crate::models::SignerError;

/// Signs with the distribution account keypair loaded from the environment.
pub struct DistributionAccountEnvSigner {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for DistributionAccountEnvSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionAccountEnvSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl DistributionAccountEnvSigner {
    pub fn new(seed: &str) -> Result<Self, SignerError> {
        let signing_key = signing_key_from_seed(seed)?;
        let address = account_address(&signing_key);
        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl StellarSignTrait for DistributionAccountEnvSigner {
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
        for account in accounts {
            if account != &self.address {
                return Err(SignerError::UnknownAccount(account.clone()));
            }
            envelope = sign_with_key(envelope, network_passphrase, &self.signing_key)?;
        }
        Ok(envelope)
    }
}
