//! System-wide constants for Swapline.

/// Default selection retries after the first attempt.
pub const DEFAULT_SELECTION_MAX_RETRIES: u32 = 8;

/// Default base backoff between selection attempts in milliseconds.
pub const DEFAULT_SELECTION_RETRY_SLEEP_MS: u64 = 100;

/// Default backoff ceiling in milliseconds.
pub const DEFAULT_SELECTION_RETRY_CAP_MS: u64 = 2000;

/// Default number of records per index page.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Default counterparty timeout in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// At most one outstanding message per direction per session.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Well-known name of the payment-asset issuer.
pub const DEFAULT_CURRENCY_ISSUER: &str = "CurrencyIssuer";

/// Inbox depth for incoming sessions per node.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Domain separator hashed in front of every transaction body.
pub const TX_ID_DOMAIN: &[u8] = b"swapline:tx:v1:";

pub const ENV_SESSION_TIMEOUT_MS: &str = "SWAPLINE_SESSION_TIMEOUT_MS";
pub const ENV_SELECTION_MAX_RETRIES: &str = "SWAPLINE_SELECTION_MAX_RETRIES";
pub const ENV_CURRENCY_ISSUER: &str = "SWAPLINE_CURRENCY_ISSUER";
