//! Well-known server administration commands
//!
//! Anything can be sent as raw text; these variants only spare callers from
//! remembering the exact spelling the server expects.

use std::fmt;

/// Target every player with [`ServerCommand::Say`].
pub const ALL_PLAYERS: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Players,
    Bans,
    Missions,
    Admins,
    Say { player: i32, text: String },
    Kick { player: u32, reason: Option<String> },
    /// Ban a connected player; `minutes == 0` bans permanently
    Ban { player: u32, minutes: u32, reason: Option<String> },
    /// Ban a GUID or IP address that is not necessarily connected
    AddBan { target: String, minutes: u32, reason: Option<String> },
    RemoveBan { ban: u32 },
    LoadBans,
    WriteBans,
    LoadScripts,
    LoadEvents,
    MaxPing(u32),
    ChangePassword(String),
    Lock,
    Unlock,
    Mission(String),
    Init,
    Reassign,
    Restart,
    RestartServer,
    Shutdown,
    ShutdownServer,
    Logout,
    Exit,
}

fn with_reason(f: &mut fmt::Formatter<'_>, reason: &Option<String>) -> fmt::Result {
    match reason {
        Some(reason) => write!(f, " {}", reason),
        None => Ok(()),
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerCommand::Players => f.write_str("players"),
            ServerCommand::Bans => f.write_str("bans"),
            ServerCommand::Missions => f.write_str("missions"),
            ServerCommand::Admins => f.write_str("admins"),
            ServerCommand::Say { player, text } => write!(f, "say {} {}", player, text),
            ServerCommand::Kick { player, reason } => {
                write!(f, "kick {}", player)?;
                with_reason(f, reason)
            }
            ServerCommand::Ban {
                player,
                minutes,
                reason,
            } => {
                write!(f, "ban {} {}", player, minutes)?;
                with_reason(f, reason)
            }
            ServerCommand::AddBan {
                target,
                minutes,
                reason,
            } => {
                write!(f, "addBan {} {}", target, minutes)?;
                with_reason(f, reason)
            }
            ServerCommand::RemoveBan { ban } => write!(f, "removeBan {}", ban),
            ServerCommand::LoadBans => f.write_str("loadBans"),
            ServerCommand::WriteBans => f.write_str("writeBans"),
            ServerCommand::LoadScripts => f.write_str("loadScripts"),
            ServerCommand::LoadEvents => f.write_str("loadEvents"),
            ServerCommand::MaxPing(ping) => write!(f, "maxPing {}", ping),
            ServerCommand::ChangePassword(password) => write!(f, "RConPassword {}", password),
            ServerCommand::Lock => f.write_str("#lock"),
            ServerCommand::Unlock => f.write_str("#unlock"),
            ServerCommand::Mission(name) => write!(f, "#mission {}", name),
            ServerCommand::Init => f.write_str("#init"),
            ServerCommand::Reassign => f.write_str("#reassign"),
            ServerCommand::Restart => f.write_str("#restart"),
            ServerCommand::RestartServer => f.write_str("#restartserver"),
            ServerCommand::Shutdown => f.write_str("#shutdown"),
            ServerCommand::ShutdownServer => f.write_str("#shutdownserver"),
            ServerCommand::Logout => f.write_str("#logout"),
            ServerCommand::Exit => f.write_str("#exit"),
        }
    }
}

impl From<ServerCommand> for String {
    fn from(command: ServerCommand) -> Self {
        command.to_string()
    }
}
