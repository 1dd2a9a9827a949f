//! Event-signature verification boundary.
//!
//! A valid event must satisfy `id == sha256(canonical(...))` and carry a
//! valid Schnorr `sig` over that id — `Event::verify` checks both. This
//! module exists so call sites (the BLS, the bootstrap handshake) have one
//! place to go from "untrusted bytes" to "verified event" with our own
//! error type.

use nostr_sdk::Event;

use crate::error::Error;

/// Verify `event`'s id hash and Schnorr signature.
///
/// Returns `Ok(())` on success, `Err(Error::InvalidSignature)` otherwise —
/// callers that need the BLS's exact wire message ("Invalid event
/// signature") read it off that variant.
pub fn verify_event(event: &Event) -> Result<(), Error> {
    event.verify().map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, JsonUtil, Keys, Kind};

    #[test]
    fn accepts_properly_signed_event() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();
        assert!(verify_event(&event).is_ok());
    }

    #[test]
    fn rejects_tampered_content() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&event.as_json()).unwrap();
        json["content"] = serde_json::Value::String("tampered".into());
        let tampered: Event = serde_json::from_value(json).unwrap();
        assert!(verify_event(&tampered).is_err());
    }
}
