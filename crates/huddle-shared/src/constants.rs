/// Page size used when a listing request omits `limit` (or sends 0).
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Upper bound on `limit` for every paginated listing.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Name stored on every single (direct) conversation.
pub const SINGLE_CHAT_NAME: &str = "single_chat";

/// Default lifetime of an issued session token.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 365;

/// Longest session lifetime accepted from configuration.
pub const MAX_SESSION_TTL_DAYS: i64 = 36_500;

/// Separator between the payload and signature halves of a session token.
pub const SESSION_TOKEN_SEPARATOR: char = '.';
