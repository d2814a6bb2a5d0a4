use std::time::Duration;

/// Number of ledgers a job stays locked after it is picked up.
pub const INCREMENT_FOR_MAX_LEDGER_BOUNDS: u32 = 10;

/// Lower bound for the configurable base fee, in stroops.
pub const MIN_BASE_FEE: u32 = 100;

/// Upper bound on channel accounts the manager is allowed to use.
pub const MAX_NUM_CHANNEL_ACCOUNTS: usize = 1000;

/// Minimum interval between scheduler passes.
pub const MIN_QUEUE_POLLING_INTERVAL: Duration = Duration::from_secs(6);

/// Validity window applied to every inner transaction.
pub const TRANSACTION_TIMEOUT_SECONDS: u64 = 300;

pub const DEFAULT_LEDGER_NUMBER_MAX_AGE: Duration = Duration::from_secs(5);

pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 30;

/// Maximum byte length of a text memo.
pub const MAX_MEMO_TEXT_LENGTH: usize = 28;

pub const MAX_ASSET_CODE_LENGTH: usize = 12;

/// Fixed-point precision of Stellar amounts.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;
pub const AMOUNT_DECIMALS: usize = 7;

pub const NATIVE_ASSET_CODE: &str = "XLM";

/// Uncompressed secp256r1 public key length used by smart wallets.
pub const WALLET_PUBLIC_KEY_LENGTH: usize = 65;
pub const WASM_HASH_LENGTH: usize = 32;
