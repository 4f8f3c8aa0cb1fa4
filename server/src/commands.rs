//! Canned command replies
//!
//! The development server knows just enough commands to exercise every
//! response shape a client has to handle: bare acks, single-datagram bodies,
//! multi-part bodies and commands that trigger console messages.

use crate::network::ServerConfig;
use rcon_shared::Datagram;

/// Number of parts produced by `getplayersmulti`
pub const MULTI_PART_DEMO_PARTS: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub datagrams: Vec<Datagram>,
    /// Console message to send to every logged-in client
    pub broadcast: Option<String>,
}

impl Reply {
    fn ack(sequence: u8) -> Self {
        Reply {
            datagrams: vec![Datagram::CommandAck { sequence }],
            broadcast: None,
        }
    }

    fn body(sequence: u8, body: String, config: &ServerConfig) -> Self {
        Reply {
            datagrams: split_body(sequence, body.as_bytes(), config.fragment_size),
            broadcast: None,
        }
    }
}

pub fn respond(sequence: u8, text: &str, config: &ServerConfig) -> Reply {
    let text = text.trim();
    let (name, args) = match text.split_once(' ') {
        Some((name, args)) => (name, args.trim()),
        None => (text, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        // Keep-alive probe
        "" => Reply::ack(sequence),
        "players" => Reply::body(sequence, player_list(&config.players), config),
        "getplayersmulti" => {
            let parts: Vec<String> = (0..MULTI_PART_DEMO_PARTS)
                .map(|index| format!("Part {} ", index))
                .collect();
            Reply {
                datagrams: parts_to_datagrams(sequence, &parts),
                broadcast: None,
            }
        }
        "say" => match args.split_once(' ') {
            Some(("-1", message)) => Reply {
                datagrams: vec![Datagram::CommandAck { sequence }],
                broadcast: Some(format!("RCon admin: (Global) {}", message)),
            },
            _ => Reply::body(sequence, "Unknown command".to_string(), config),
        },
        "loadbans" | "writebans" | "loadscripts" | "loadevents" | "#lock" | "#unlock" => {
            Reply::ack(sequence)
        }
        _ => Reply::body(sequence, "Unknown command".to_string(), config),
    }
}

fn player_list(players: &[String]) -> String {
    let mut body = String::from("Players on server:\n[#] [IP Address]:[Port] [Ping] [GUID] [Name]\n--------------------------------------------------");
    for (index, name) in players.iter().enumerate() {
        body.push_str(&format!(
            "\n{} 127.0.0.1:{} 0 {:032x}(OK) {}",
            index,
            2304 + index,
            index,
            name
        ));
    }
    body.push_str(&format!("\n({} players in total)", players.len()));
    body
}

/// Splits `body` into multi-part datagrams when it exceeds `fragment_size`.
/// A response never uses more than 255 parts.
pub fn split_body(sequence: u8, body: &[u8], fragment_size: usize) -> Vec<Datagram> {
    let fragment_size = fragment_size.max(1);
    if body.len() <= fragment_size {
        return vec![Datagram::CommandResponse {
            sequence,
            body: String::from_utf8_lossy(body).into_owned(),
        }];
    }

    let fragment_size = fragment_size.max(body.len().div_ceil(u8::MAX as usize));
    let chunks: Vec<&[u8]> = body.chunks(fragment_size).collect();
    let total = chunks.len() as u8;

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, fragment)| Datagram::CommandResponsePart {
            sequence,
            index: index as u8,
            total,
            fragment: fragment.to_vec(),
        })
        .collect()
}

fn parts_to_datagrams(sequence: u8, parts: &[String]) -> Vec<Datagram> {
    let total = parts.len() as u8;
    parts
        .iter()
        .enumerate()
        .map(|(index, part)| Datagram::CommandResponsePart {
            sequence,
            index: index as u8,
            total,
            fragment: part.as_bytes().to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::default()
    }

    #[test]
    fn test_empty_command_is_acked() {
        let reply = respond(7, "", &config());
        assert_eq!(reply.datagrams, vec![Datagram::CommandAck { sequence: 7 }]);
        assert_eq!(reply.broadcast, None);
    }

    #[test]
    fn test_players_fits_in_one_datagram() {
        let reply = respond(1, "players", &config());
        match &reply.datagrams[..] {
            [Datagram::CommandResponse { sequence: 1, body }] => {
                assert!(body.starts_with("Players on server:"));
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_multi_part_demo() {
        let reply = respond(3, "getplayersmulti", &config());
        assert_eq!(reply.datagrams.len(), MULTI_PART_DEMO_PARTS as usize);
        assert_eq!(
            reply.datagrams[4],
            Datagram::CommandResponsePart {
                sequence: 3,
                index: 4,
                total: 10,
                fragment: b"Part 4 ".to_vec(),
            }
        );
    }

    #[test]
    fn test_global_say_broadcasts() {
        let reply = respond(2, "say -1 hello there", &config());
        assert_eq!(reply.datagrams, vec![Datagram::CommandAck { sequence: 2 }]);
        assert_eq!(
            reply.broadcast.as_deref(),
            Some("RCon admin: (Global) hello there")
        );
    }

    #[test]
    fn test_unknown_command() {
        let reply = respond(9, "frobnicate", &config());
        assert_eq!(
            reply.datagrams,
            vec![Datagram::CommandResponse {
                sequence: 9,
                body: "Unknown command".to_string(),
            }]
        );
    }

    #[test]
    fn test_split_body_preserves_order() {
        let body = b"abcdefghij";
        let parts = split_body(5, body, 4);
        assert_eq!(parts.len(), 3);

        let mut joined = Vec::new();
        for (expected_index, part) in parts.iter().enumerate() {
            match part {
                Datagram::CommandResponsePart {
                    index,
                    total,
                    fragment,
                    ..
                } => {
                    assert_eq!(*index as usize, expected_index);
                    assert_eq!(*total, 3);
                    joined.extend_from_slice(fragment);
                }
                other => panic!("Unexpected datagram: {:?}", other),
            }
        }
        assert_eq!(joined, body);
    }

    #[test]
    fn test_split_body_caps_part_count() {
        let body = vec![b'x'; 1000];
        let parts = split_body(0, &body, 1);
        assert!(parts.len() <= u8::MAX as usize);
    }
}
