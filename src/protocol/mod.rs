//! Text command protocol
//!
//! Commands arrive as `<ID arg arg ...>` frames. The [`FrameConsumer`] cuts
//! frames out of a byte stream, the [`ProtocolDispatcher`] tokenizes them and
//! hands the arguments to the [`CommandAdapter`] registered for `ID`.

pub mod dispatcher;
pub mod system;

pub use dispatcher::{FrameConsumer, ProtocolDispatcher};
pub use system::{ConfigEraseCommand, ConfigStoreCommand};

use crate::error::{AccessoryError, Result};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::debug;

/// Generic success token
pub const COMMAND_SUCCESSFUL_RESPONSE: &str = "<O>";

/// Generic failure token
pub const COMMAND_FAILED_RESPONSE: &str = "<X>";

/// A protocol command family
///
/// Note: `process` takes &self so adapters can be shared by every client
/// session. Adapters hold shared handles on the registries they drive.
#[async_trait]
pub trait CommandAdapter: Send + Sync {
    /// Command id, the first token of a frame (e.g. "Z", "RS")
    fn id(&self) -> &str;

    /// Handle one command and return the direct reply (may be empty)
    async fn process(&self, args: &[&str]) -> String;
}

/// Parse a plain base-10 integer token
///
/// Signs, whitespace, hex prefixes and out of range values are rejected.
pub fn parse_number<T: FromStr>(token: &str, what: &str) -> Result<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AccessoryError::MalformedCommand(format!(
            "{} '{}' is not a number",
            what, token
        )));
    }
    token.parse::<T>().map_err(|_| {
        AccessoryError::MalformedCommand(format!("{} '{}' is out of range", what, token))
    })
}

/// Turn an adapter result into the reply sent to the client
pub fn reply_or_fail(command: &str, result: Result<String>) -> String {
    match result {
        Ok(reply) => reply,
        Err(e) => {
            debug!("Command {} failed: {}", command, e);
            COMMAND_FAILED_RESPONSE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<u16>("42", "id").unwrap(), 42);
        assert_eq!(parse_number::<u8>("007", "pin").unwrap(), 7);
    }

    #[test]
    fn test_parse_number_rejects_non_decimal() {
        for token in ["", "-1", "+1", "0x10", "1.5", "abc", " 1"] {
            assert!(
                matches!(parse_number::<u16>(token, "id"), Err(AccessoryError::MalformedCommand(_))),
                "token {:?} should be rejected",
                token
            );
        }
    }

    #[test]
    fn test_parse_number_rejects_overflow() {
        assert!(parse_number::<u8>("256", "pin").is_err());
        assert!(parse_number::<u16>("65536", "id").is_err());
    }

    #[test]
    fn test_reply_or_fail() {
        assert_eq!(reply_or_fail("Z", Ok("<O>".into())), "<O>");
        assert_eq!(
            reply_or_fail("Z", Err(AccessoryError::output_not_found(1))),
            COMMAND_FAILED_RESPONSE
        );
    }
}
