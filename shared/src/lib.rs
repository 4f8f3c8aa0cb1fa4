//! Wire format shared by the RCon client and the development server.
//!
//! Every datagram is framed as `"BE"` + CRC32(payload) in little-endian byte
//! order + payload. The payload always starts with `0xFF` followed by a type
//! byte. Sequence numbers are single bytes that wrap modulo 256.

use thiserror::Error;

pub const MAGIC: [u8; 2] = *b"BE";
pub const HEADER_LEN: usize = 6;
pub const PAYLOAD_MARKER: u8 = 0xFF;

pub const TYPE_LOGIN: u8 = 0x00;
pub const TYPE_COMMAND: u8 = 0x01;
pub const TYPE_MESSAGE: u8 = 0x02;

/// Marker byte following the sequence number of a multi-part response.
pub const MULTI_PART_MARKER: u8 = 0x00;

/// Receive buffer size. Servers keep responses well below this and split
/// anything larger into multi-part responses.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Offsets into the full datagram (header included).
const TYPE_OFFSET: usize = HEADER_LEN + 1;
const SEQUENCE_OFFSET: usize = HEADER_LEN + 2;
const BODY_OFFSET: usize = HEADER_LEN + 3;
const PART_TOTAL_OFFSET: usize = HEADER_LEN + 4;
const PART_INDEX_OFFSET: usize = HEADER_LEN + 5;
const PART_BODY_OFFSET: usize = HEADER_LEN + 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    // Client to server
    LoginRequest {
        password: String,
    },
    Command {
        sequence: u8,
        text: String,
    },
    MessageAck {
        sequence: u8,
    },

    // Server to client
    LoginResponse {
        success: bool,
    },
    CommandAck {
        sequence: u8,
    },
    CommandResponse {
        sequence: u8,
        body: String,
    },
    CommandResponsePart {
        sequence: u8,
        index: u8,
        total: u8,
        fragment: Vec<u8>,
    },
    ConsoleMessage {
        sequence: u8,
        body: String,
    },
}

impl Datagram {
    pub fn sequence(&self) -> Option<u8> {
        match self {
            Datagram::LoginRequest { .. } | Datagram::LoginResponse { .. } => None,
            Datagram::Command { sequence, .. }
            | Datagram::MessageAck { sequence }
            | Datagram::CommandAck { sequence }
            | Datagram::CommandResponse { sequence, .. }
            | Datagram::CommandResponsePart { sequence, .. }
            | Datagram::ConsoleMessage { sequence, .. } => Some(*sequence),
        }
    }

    /// Builds the payload: everything after the 6-byte header.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = vec![PAYLOAD_MARKER];

        match self {
            Datagram::LoginRequest { password } => {
                payload.push(TYPE_LOGIN);
                payload.extend_from_slice(password.as_bytes());
            }
            Datagram::LoginResponse { success } => {
                payload.push(TYPE_LOGIN);
                payload.push(u8::from(*success));
            }
            Datagram::Command { sequence, text } => {
                payload.push(TYPE_COMMAND);
                payload.push(*sequence);
                payload.extend_from_slice(text.as_bytes());
            }
            Datagram::CommandAck { sequence } => {
                payload.push(TYPE_COMMAND);
                payload.push(*sequence);
            }
            Datagram::CommandResponse { sequence, body } => {
                payload.push(TYPE_COMMAND);
                payload.push(*sequence);
                payload.extend_from_slice(body.as_bytes());
            }
            Datagram::CommandResponsePart {
                sequence,
                index,
                total,
                fragment,
            } => {
                payload.push(TYPE_COMMAND);
                payload.push(*sequence);
                payload.push(MULTI_PART_MARKER);
                payload.push(*total);
                payload.push(*index);
                payload.extend_from_slice(fragment);
            }
            Datagram::ConsoleMessage { sequence, body } => {
                payload.push(TYPE_MESSAGE);
                payload.push(*sequence);
                payload.extend_from_slice(body.as_bytes());
            }
            Datagram::MessageAck { sequence } => {
                payload.push(TYPE_MESSAGE);
                payload.push(*sequence);
            }
        }

        payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram too short ({0} bytes)")]
    TooShort(usize),
    #[error("datagram does not start with \"BE\"")]
    BadMagic,
    #[error("checksum mismatch: header says {expected:#010x}, payload hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("payload does not start with 0xFF")]
    MissingMarker,
    #[error("unknown datagram type {0:#04x}")]
    UnknownType(u8),
    #[error("malformed datagram: {0}")]
    Malformed(&'static str),
}

impl DecodeError {
    /// Corruption in transit, as opposed to a well-formed datagram that
    /// breaks the protocol.
    pub fn is_checksum(&self) -> bool {
        matches!(self, DecodeError::ChecksumMismatch { .. })
    }
}

/// CRC32 (reflected polynomial 0xEDB88320, seed 0xFFFFFFFF, complemented).
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Wraps a payload in the `"BE"` + checksum header.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&checksum(payload).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn encode(datagram: &Datagram) -> Vec<u8> {
    frame(&datagram.payload())
}

/// Decodes a datagram sent by the server.
pub fn decode(bytes: &[u8]) -> Result<Datagram, DecodeError> {
    if bytes.len() <= SEQUENCE_OFFSET {
        return Err(DecodeError::TooShort(bytes.len()));
    }
    verify(bytes)?;

    let sequence = bytes[SEQUENCE_OFFSET];

    match bytes[TYPE_OFFSET] {
        TYPE_LOGIN => Ok(Datagram::LoginResponse {
            success: sequence == 1,
        }),
        TYPE_COMMAND => {
            if bytes.len() == BODY_OFFSET {
                return Ok(Datagram::CommandAck { sequence });
            }

            if bytes[BODY_OFFSET] != MULTI_PART_MARKER {
                return Ok(Datagram::CommandResponse {
                    sequence,
                    body: text(&bytes[BODY_OFFSET..]),
                });
            }

            if bytes.len() < PART_BODY_OFFSET {
                return Err(DecodeError::Malformed("truncated multi-part header"));
            }

            let total = bytes[PART_TOTAL_OFFSET];
            let index = bytes[PART_INDEX_OFFSET];
            if total == 0 {
                return Err(DecodeError::Malformed("multi-part response with zero parts"));
            }
            if index >= total {
                return Err(DecodeError::Malformed("part index out of range"));
            }

            Ok(Datagram::CommandResponsePart {
                sequence,
                index,
                total,
                fragment: bytes[PART_BODY_OFFSET..].to_vec(),
            })
        }
        TYPE_MESSAGE => Ok(Datagram::ConsoleMessage {
            sequence,
            body: text(&bytes[BODY_OFFSET..]),
        }),
        other => Err(DecodeError::UnknownType(other)),
    }
}

/// Decodes a datagram sent by a client.
pub fn decode_request(bytes: &[u8]) -> Result<Datagram, DecodeError> {
    if bytes.len() < SEQUENCE_OFFSET {
        return Err(DecodeError::TooShort(bytes.len()));
    }
    verify(bytes)?;

    match bytes[TYPE_OFFSET] {
        TYPE_LOGIN => Ok(Datagram::LoginRequest {
            password: text(&bytes[SEQUENCE_OFFSET..]),
        }),
        TYPE_COMMAND => {
            let sequence = *bytes
                .get(SEQUENCE_OFFSET)
                .ok_or(DecodeError::Malformed("command without sequence number"))?;
            Ok(Datagram::Command {
                sequence,
                text: text(&bytes[BODY_OFFSET.min(bytes.len())..]),
            })
        }
        TYPE_MESSAGE => {
            let sequence = *bytes
                .get(SEQUENCE_OFFSET)
                .ok_or(DecodeError::Malformed("acknowledgement without sequence number"))?;
            Ok(Datagram::MessageAck { sequence })
        }
        other => Err(DecodeError::UnknownType(other)),
    }
}

fn verify(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes[..2] != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let expected = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let actual = checksum(&bytes[HEADER_LEN..]);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    if bytes[HEADER_LEN] != PAYLOAD_MARKER {
        return Err(DecodeError::MissingMarker);
    }

    Ok(())
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_reference_value() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_login_request_layout() {
        let bytes = encode(&Datagram::LoginRequest {
            password: "secret".to_string(),
        });

        assert_eq!(&bytes[..2], b"BE");
        assert_eq!(&bytes[6..8], &[0xFF, 0x00]);
        assert_eq!(&bytes[8..], b"secret");

        let crc = checksum(&bytes[6..]).to_be_bytes();
        assert_eq!(&bytes[2..6], &[crc[3], crc[2], crc[1], crc[0]]);
    }

    #[test]
    fn test_command_layout() {
        let bytes = encode(&Datagram::Command {
            sequence: 7,
            text: "players".to_string(),
        });

        assert_eq!(&bytes[6..9], &[0xFF, 0x01, 7]);
        assert_eq!(&bytes[9..], b"players");
    }

    #[test]
    fn test_decode_login_response() {
        let ok = frame(&[0xFF, 0x00, 0x01]);
        let denied = frame(&[0xFF, 0x00, 0x00]);

        assert_eq!(decode(&ok), Ok(Datagram::LoginResponse { success: true }));
        assert_eq!(decode(&denied), Ok(Datagram::LoginResponse { success: false }));
    }

    #[test]
    fn test_decode_bare_ack() {
        let bytes = frame(&[0xFF, 0x01, 0x2A]);
        assert_eq!(bytes.len(), 9);
        assert_eq!(decode(&bytes), Ok(Datagram::CommandAck { sequence: 42 }));
    }

    #[test]
    fn test_decode_single_response() {
        let mut payload = vec![0xFF, 0x01, 0x03];
        payload.extend_from_slice(b"Players on server:");

        match decode(&frame(&payload)).unwrap() {
            Datagram::CommandResponse { sequence, body } => {
                assert_eq!(sequence, 3);
                assert_eq!(body, "Players on server:");
            }
            other => panic!("Unexpected datagram: {:?}", other),
        }
    }

    #[test]
    fn test_decode_multi_part_header() {
        let mut payload = vec![0xFF, 0x01, 0x05, 0x00, 0x03, 0x01];
        payload.extend_from_slice(b"middle");

        assert_eq!(
            decode(&frame(&payload)),
            Ok(Datagram::CommandResponsePart {
                sequence: 5,
                index: 1,
                total: 3,
                fragment: b"middle".to_vec(),
            })
        );
    }

    #[test]
    fn test_decode_multi_part_rejects_bad_header() {
        let truncated = frame(&[0xFF, 0x01, 0x05, 0x00, 0x03]);
        assert!(matches!(decode(&truncated), Err(DecodeError::Malformed(_))));

        let out_of_range = frame(&[0xFF, 0x01, 0x05, 0x00, 0x03, 0x03, b'x']);
        assert!(matches!(decode(&out_of_range), Err(DecodeError::Malformed(_))));

        let zero_parts = frame(&[0xFF, 0x01, 0x05, 0x00, 0x00, 0x00, b'x']);
        assert!(matches!(decode(&zero_parts), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_console_message() {
        let mut payload = vec![0xFF, 0x02, 0x09];
        payload.extend_from_slice(b"Player #1 connected");

        assert_eq!(
            decode(&frame(&payload)),
            Ok(Datagram::ConsoleMessage {
                sequence: 9,
                body: "Player #1 connected".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let bytes = frame(&[0xFF, 0x07, 0x00]);
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownType(0x07)));
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode(&[]), Err(DecodeError::TooShort(0)));
        assert_eq!(
            decode(&frame(&[0xFF, 0x01])),
            Err(DecodeError::TooShort(8))
        );
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut bytes = frame(&[0xFF, 0x01, 0x00]);
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(DecodeError::BadMagic));
    }

    #[test]
    fn test_decode_missing_marker() {
        let bytes = frame(&[0xFE, 0x01, 0x00]);
        assert_eq!(decode(&bytes), Err(DecodeError::MissingMarker));
    }

    #[test]
    fn test_any_flipped_payload_byte_fails_checksum() {
        let bytes = encode(&Datagram::CommandResponse {
            sequence: 200,
            body: "Missions on server:\nAltis".to_string(),
        });

        for position in HEADER_LEN..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[position] ^= 0x01;

            let error = decode(&tampered).unwrap_err();
            assert!(error.is_checksum(), "byte {} not detected: {}", position, error);
        }
    }

    #[test]
    fn test_server_datagrams_roundtrip() {
        let datagrams = vec![
            Datagram::LoginResponse { success: true },
            Datagram::CommandAck { sequence: 255 },
            Datagram::CommandResponse {
                sequence: 0,
                body: "Players on server:".to_string(),
            },
            Datagram::CommandResponsePart {
                sequence: 12,
                index: 9,
                total: 10,
                fragment: b"last part".to_vec(),
            },
            Datagram::ConsoleMessage {
                sequence: 1,
                body: "RCon admin #0 logged in".to_string(),
            },
            Datagram::ConsoleMessage {
                sequence: 2,
                body: String::new(),
            },
        ];

        for datagram in datagrams {
            assert_eq!(decode(&encode(&datagram)), Ok(datagram));
        }
    }

    #[test]
    fn test_client_datagrams_roundtrip() {
        let datagrams = vec![
            Datagram::LoginRequest {
                password: "secret".to_string(),
            },
            Datagram::Command {
                sequence: 128,
                text: "say -1 hello".to_string(),
            },
            Datagram::Command {
                sequence: 3,
                text: String::new(),
            },
            Datagram::MessageAck { sequence: 77 },
        ];

        for datagram in datagrams {
            assert_eq!(decode_request(&encode(&datagram)), Ok(datagram));
        }
    }

    #[test]
    fn test_sequence_accessor() {
        assert_eq!(Datagram::LoginResponse { success: false }.sequence(), None);
        assert_eq!(Datagram::MessageAck { sequence: 4 }.sequence(), Some(4));
    }
}
