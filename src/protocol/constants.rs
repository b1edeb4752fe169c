//! Postgres protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: i32 = 0x04D2_162F;

/// CancelRequest code (80877102 = 1234 << 16 | 5678)
pub const CANCEL_REQUEST_CODE: i32 = 0x04D2_162E;

/// GSSENCRequest code (80877104 = 1234 << 16 | 5680)
pub const GSSENC_REQUEST_CODE: i32 = 0x04D2_1630;

/// Length of an SSLRequest, including the length field itself
pub const SSL_REQUEST_LEN: i32 = 8;

/// Server response accepting an SSLRequest
pub const SSL_ACCEPT: u8 = b'S';

/// Largest startup packet a server accepts (`MAX_STARTUP_PACKET_LENGTH`)
pub const MAX_STARTUP_PACKET_LEN: usize = 10_000;

/// Port used when a backend address omits one
pub const DEFAULT_PORT: u16 = 5432;

/// Well-known startup parameter names
pub mod params {
    /// Role to connect as (required)
    pub const USER: &str = "user";

    /// Database to connect to (defaults to the user name server-side)
    pub const DATABASE: &str = "database";
}
