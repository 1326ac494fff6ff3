//! Decoding of the directory's binary object identifiers.
//!
//! The remote store encodes a 16-byte object GUID in a mixed-endian layout:
//! the first three groups (u32, u16, u16) are little-endian, the remaining
//! eight bytes are big-endian.

use uuid::Uuid;

/// Decodes a directory object GUID into a canonical [`Uuid`].
///
/// Returns `None` for any byte sequence whose length is not exactly 16;
/// a malformed identifier is "no identifier", not an error.
pub fn guid_from_bytes(bytes: &[u8]) -> Option<Uuid> {
    if bytes.len() != 16 {
        return None;
    }
    let d1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let d2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let d3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    let mut d4 = [0u8; 8];
    d4.copy_from_slice(&bytes[8..16]);
    Some(Uuid::from_fields(d1, d2, d3, &d4))
}

/// Encodes a [`Uuid`] back into the directory's mixed-endian byte layout.
///
/// Inverse of [`guid_from_bytes`]; mainly useful for building test
/// directories.
pub fn guid_to_bytes(guid: &Uuid) -> [u8; 16] {
    let (d1, d2, d3, d4) = guid.as_fields();
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&d1.to_le_bytes());
    out[4..6].copy_from_slice(&d2.to_le_bytes());
    out[6..8].copy_from_slice(&d3.to_le_bytes());
    out[8..16].copy_from_slice(d4);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_endian_layout() {
        let bytes: Vec<u8> = (1..=16).collect();
        let guid = guid_from_bytes(&bytes).unwrap();
        assert_eq!(
            guid.to_string(),
            "04030201-0605-0807-090a-0b0c0d0e0f10"
        );
    }

    #[test]
    fn wrong_length_yields_no_identifier() {
        assert!(guid_from_bytes(&[]).is_none());
        assert!(guid_from_bytes(&[0u8; 15]).is_none());
        assert!(guid_from_bytes(&[0u8; 17]).is_none());
    }

    #[test]
    fn encode_is_inverse_of_decode() {
        let guid: Uuid = "04030201-0605-0807-090a-0b0c0d0e0f10".parse().unwrap();
        let bytes = guid_to_bytes(&guid);
        assert_eq!(bytes.to_vec(), (1..=16).collect::<Vec<u8>>());
        assert_eq!(guid_from_bytes(&bytes), Some(guid));
    }
}
