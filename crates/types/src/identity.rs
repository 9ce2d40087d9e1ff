//! Identity helpers

use crate::units::Identity;

/// Derive a deterministic identity from a human-readable label.
///
/// Used for well-known accounts (custody, executor) and in tests.
pub fn identity_from_label(label: &str) -> Identity {
    *blake3::hash(label.as_bytes()).as_bytes()
}

/// Parse a 64-character hex string into an identity.
pub fn identity_from_hex(value: &str) -> Result<Identity, hex::FromHexError> {
    let mut id = [0u8; 32];
    hex::decode_to_slice(value.trim_start_matches("0x"), &mut id)?;
    Ok(id)
}

/// Short hex prefix for log lines.
pub fn short_id(id: &Identity) -> String {
    hex::encode(&id[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_identity_is_deterministic() {
        assert_eq!(identity_from_label("custody"), identity_from_label("custody"));
        assert_ne!(identity_from_label("custody"), identity_from_label("executor"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = identity_from_label("alice");
        let encoded = hex::encode(id);
        assert_eq!(identity_from_hex(&encoded).unwrap(), id);
        assert_eq!(identity_from_hex(&format!("0x{encoded}")).unwrap(), id);
        assert!(identity_from_hex("abcd").is_err());
    }

    #[test]
    fn test_short_id() {
        let mut id = [0u8; 32];
        id[0] = 0xab;
        id[3] = 0x01;
        assert_eq!(short_id(&id), "ab000001");
    }
}
