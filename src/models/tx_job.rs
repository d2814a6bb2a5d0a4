use serde::{Deserialize, Serialize};

use super::{ChannelAccount, Transaction};

/// A locked channel account paired with a locked transaction.
///
/// Jobs are never persisted: they are a view over the two rows locked
/// together by the store and are owned by a single worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxJob {
    pub channel_account: ChannelAccount,
    pub transaction: Transaction,
    /// Ledger both rows are locked until.
    pub locked_until_ledger_number: u32,
}

impl TxJob {
    pub fn new(channel_account: ChannelAccount, transaction: Transaction) -> Self {
        let locked_until_ledger_number = transaction
            .locked_until_ledger_number
            .unwrap_or_default()
            .min(channel_account.locked_until_ledger_number.unwrap_or_default());
        Self {
            channel_account,
            transaction,
            locked_until_ledger_number,
        }
    }
}
