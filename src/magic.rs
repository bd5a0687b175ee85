//! Wake-on-LAN magic packet encoding
//!
//! A magic packet is six `0xFF` bytes followed by the target's 6-byte
//! hardware address repeated sixteen times.

use std::fmt;

use crate::error::WakeError;

/// Number of octets in a hardware address
pub const MAC_LEN: usize = 6;

/// Number of times the address is repeated in the payload
const REPETITIONS: usize = 16;

/// Total size of an encoded magic packet
pub const MAGIC_PACKET_LEN: usize = MAC_LEN + MAC_LEN * REPETITIONS;

/// A parsed 6-octet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    /// Parse `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff`, `aabb.ccdd.eeff` or
    /// `aabbccddeeff` (case-insensitive)
    pub fn parse(input: &str) -> Result<Self, WakeError> {
        let invalid = || WakeError::InvalidAddress(input.to_string());
        let trimmed = input.trim();

        let digits: String = match trimmed.chars().find(|c| matches!(*c, ':' | '-' | '.')) {
            Some('.') => {
                let groups: Vec<&str> = trimmed.split('.').collect();
                if groups.len() != 3 || groups.iter().any(|g| g.len() != 4) {
                    return Err(invalid());
                }
                groups.concat()
            }
            Some(sep) => {
                let groups: Vec<&str> = trimmed.split(sep).collect();
                if groups.len() != MAC_LEN || groups.iter().any(|g| g.len() != 2) {
                    return Err(invalid());
                }
                groups.concat()
            }
            None => trimmed.to_string(),
        };

        if digits.len() != MAC_LEN * 2 {
            return Err(invalid());
        }

        let bytes = hex::decode(&digits).map_err(|_| invalid())?;
        let octets: [u8; MAC_LEN] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self(octets))
    }

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Encoded wake-on-LAN payload, built fresh for every wake attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac: MacAddress) -> Self {
        let mut payload = [0xFF; MAGIC_PACKET_LEN];
        for chunk in payload[MAC_LEN..].chunks_exact_mut(MAC_LEN) {
            chunk.copy_from_slice(&mac.0);
        }
        Self(payload)
    }

    /// Parse the address and encode it in one step
    pub fn from_address(input: &str) -> Result<Self, WakeError> {
        MacAddress::parse(input).map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OCTETS: [u8; 6] = [0x00, 0x11, 0x22, 0xAA, 0xbb, 0xCC];

    fn assert_packet_layout(packet: &MagicPacket) {
        let bytes = packet.as_bytes();
        assert_eq!(bytes.len(), 102);
        assert!(bytes[..6].iter().all(|&b| b == 0xFF));
        for chunk in bytes[6..].chunks(6) {
            assert_eq!(chunk, OCTETS);
        }
    }

    #[test]
    fn test_accepted_address_forms() {
        for input in [
            "00:11:22:aa:bb:cc",
            "00-11-22-AA-BB-CC",
            "001122aabbcc",
            "0011.22aa.bbcc",
            "  00:11:22:AA:bb:cc ",
        ] {
            let packet = MagicPacket::from_address(input)
                .unwrap_or_else(|e| panic!("{input} should parse: {e}"));
            assert_packet_layout(&packet);
        }
    }

    #[test]
    fn test_rejected_addresses() {
        for input in [
            "",
            "00:11:22:aa:bb",
            "00:11:22:aa:bb:cc:dd",
            "00:11:22:aa:bb:zz",
            "0011223344",
            "00112233445566",
            "00:11-22:aa:bb:cc",
            "0:11:22:aa:bb:ccc",
            "gg1122aabbcc",
        ] {
            match MagicPacket::from_address(input) {
                Err(WakeError::InvalidAddress(raw)) => assert_eq!(raw, input),
                other => panic!("{input:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mac_display_is_canonical() {
        let mac = MacAddress::parse("00-11-22-AA-BB-CC").unwrap();
        assert_eq!(mac.to_string(), "00:11:22:aa:bb:cc");
        assert_eq!(mac.octets(), OCTETS);
    }
}
