/// Event kind of a user's Blossom server list (BUD-03)
pub const SERVER_LIST_KIND: u32 = 10063;

/// Tag name for server entries inside a server-list record
pub const TAG_SERVER: &str = "server";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Response header carrying the server URL that served resolved content
pub const HEADER_RESOLVED_URL: &str = "x-resolved-url";

/// MIME type assumed when a server or uploader does not provide one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
