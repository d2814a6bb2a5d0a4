use std::time::Duration;

/// Job batch size applied while the network is congested.
pub const DEFAULT_BUNDLES_SELECTION_LIMIT: i32 = 8;

/// Indeterminate responses tolerated before the batch size is lowered.
pub const INDETERMINATE_RESPONSES_TOLERANCE: u32 = 10;

/// How long a lowered batch size stays in effect.
pub const LIMITER_RESET_WINDOW: Duration = Duration::from_secs(3 * 60);
