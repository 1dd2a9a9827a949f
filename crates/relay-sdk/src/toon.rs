//! TOON: a compact binary encoding for Nostr events, carried as ILP packet
//! payloads.
//!
//! TOON itself is an external, out-of-scope subsystem — the
//! core only consumes `encode`/`decode` as exact inverses. This module is a
//! reference implementation: a length-prefixed binary layout that round
//! trips a [`nostr_sdk::Event`] without re-deriving its id or signature.

use nostr_sdk::{Event, EventId, JsonUtil, Kind, PublicKey, Signature, Tags, Timestamp};

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"TOON";
const VERSION: u8 = 1;

fn write_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn read_len_prefixed<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8]> {
    if buf.len() < *cursor + 4 {
        return Err(Error::ToonDecode("truncated length prefix".into()));
    }
    let len = u32::from_be_bytes(buf[*cursor..*cursor + 4].try_into().unwrap()) as usize;
    *cursor += 4;
    if buf.len() < *cursor + len {
        return Err(Error::ToonDecode("truncated field".into()));
    }
    let slice = &buf[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

/// Encode a signed Nostr event into its TOON byte representation.
///
/// Layout: `b"TOON" | version:u8 | id(32) | pubkey(32) | created_at(u64 BE)
/// | kind(u16 BE) | sig(64) | len(tags_json) | tags_json | len(content) |
/// content`. Tags are carried as their NIP-01 JSON array form, which is
/// already the canonical representation `nostr_sdk` uses internally.
pub fn encode(event: &Event) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.extend_from_slice(event.id.as_bytes());
    buf.extend_from_slice(&event.pubkey.to_bytes());
    buf.extend_from_slice(&event.created_at.as_u64().to_be_bytes());
    buf.extend_from_slice(&event.kind.as_u16().to_be_bytes());
    buf.extend_from_slice(&event.sig.serialize());
    let tags_json = serde_json::to_vec(&event.tags)
        .map_err(|e| Error::ToonDecode(format!("tags serialize: {e}")))?;
    write_len_prefixed(&mut buf, &tags_json);
    write_len_prefixed(&mut buf, event.content.as_bytes());
    Ok(buf)
}

/// Decode a TOON payload back into a Nostr event. Does not re-verify the
/// signature — callers run [`crate::event::verify_event`] on the result.
pub fn decode(bytes: &[u8]) -> Result<Event> {
    if bytes.len() < MAGIC.len() + 1 {
        return Err(Error::ToonDecode("payload too short".into()));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::ToonDecode("bad magic".into()));
    }
    let mut cursor = MAGIC.len();
    let version = bytes[cursor];
    cursor += 1;
    if version != VERSION {
        return Err(Error::ToonDecode(format!("unsupported version {version}")));
    }

    let take = |cursor: &mut usize, n: usize| -> Result<&[u8]> {
        if bytes.len() < *cursor + n {
            return Err(Error::ToonDecode("truncated fixed field".into()));
        }
        let slice = &bytes[*cursor..*cursor + n];
        *cursor += n;
        Ok(slice)
    };

    let id_bytes = take(&mut cursor, 32)?;
    let id = EventId::from_slice(id_bytes).map_err(|e| Error::ToonDecode(e.to_string()))?;

    let pubkey_bytes = take(&mut cursor, 32)?;
    let pubkey = PublicKey::from_slice(pubkey_bytes).map_err(|e| Error::ToonDecode(e.to_string()))?;

    let created_at_bytes = take(&mut cursor, 8)?;
    let created_at = Timestamp::from(u64::from_be_bytes(created_at_bytes.try_into().unwrap()));

    let kind_bytes = take(&mut cursor, 2)?;
    let kind = Kind::from(u16::from_be_bytes(kind_bytes.try_into().unwrap()));

    let sig_bytes = take(&mut cursor, 64)?;
    let sig = Signature::from_slice(sig_bytes).map_err(|e| Error::ToonDecode(e.to_string()))?;

    let tags_json = read_len_prefixed(bytes, &mut cursor)?;
    let tags: Tags = serde_json::from_slice(tags_json)
        .map_err(|e| Error::ToonDecode(format!("tags parse: {e}")))?;

    let content_bytes = read_len_prefixed(bytes, &mut cursor)?;
    let content = String::from_utf8(content_bytes.to_vec())
        .map_err(|e| Error::ToonDecode(format!("content utf8: {e}")))?;

    let json = serde_json::json!({
        "id": id.to_hex(),
        "pubkey": pubkey.to_hex(),
        "created_at": created_at.as_u64(),
        "kind": kind.as_u16(),
        "tags": tags,
        "content": content,
        "sig": sig.to_string(),
    });
    Event::from_json(json.to_string()).map_err(|e| Error::ToonDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys};

    #[test]
    fn encode_decode_is_exact_inverse() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hello toon")
            .sign_with_keys(&keys)
            .unwrap();
        let bytes = encode(&event).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.id, event.id);
        assert_eq!(decoded.pubkey, event.pubkey);
        assert_eq!(decoded.created_at, event.created_at);
        assert_eq!(decoded.kind, event.kind);
        assert_eq!(decoded.content, event.content);
        assert_eq!(decoded.sig, event.sig);
        assert_eq!(decoded.tags, event.tags);
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(decode(b"NOPE").is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();
        let mut bytes = encode(&event).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(decode(&bytes).is_err());
    }
}
