use clap::Parser;
use log::{info, warn};
use rcon_client::{ClientConfig, RconError, Session, SessionEvent};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Remote console client", long_about = None)]
struct Args {
    /// Server host name or IP address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server RCon port
    #[arg(short, long, default_value = "2302")]
    port: u16,

    /// RCon password
    #[arg(short = 'P', long)]
    password: String,

    /// JSON file overriding the default timings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log in again automatically when the server stops answering
    #[arg(short, long)]
    reconnect: bool,

    /// Commands to run; without any, commands are read from stdin
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), RconError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    if args.reconnect {
        config.reconnect_on_packet_loss = true;
    }

    let (session, mut events) = Session::new(config);
    session.connect(&args.host, args.port, &args.password).await?;

    if !args.commands.is_empty() {
        for command in &args.commands {
            println!("{}", session.execute(command.as_str()).await?);
        }
        return session.disconnect().await;
    }

    info!("Connected, type commands or Ctrl+D to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }
                match session.execute(command).await {
                    Ok(body) => println!("{}", body),
                    Err(RconError::CommandTimeout { .. }) => eprintln!("No response to {:?}", command),
                    Err(e) => {
                        eprintln!("{}", e);
                        break;
                    }
                }
            },

            event = events.recv() => match event {
                Some(SessionEvent::ConsoleMessage { body, .. }) => println!("{}", body),
                Some(SessionEvent::Reconnecting { attempt }) => warn!("Reconnecting (attempt {})", attempt),
                Some(SessionEvent::Disconnected(reason)) => {
                    eprintln!("Disconnected: {:?}", reason);
                    break;
                }
                Some(_) => {}
                None => break,
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.disconnect().await
}
