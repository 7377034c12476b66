//! Authentication for quest-gateway
//!
//! Bearer JWTs issued by the account service. The `sub` claim is the
//! internal user id every quest operation runs under.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};
