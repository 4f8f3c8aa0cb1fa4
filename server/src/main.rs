use clap::Parser;
use log::{error, info};
use rcon_server::network::{Server, ServerConfig};
use rcon_server::ServerError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Development RCon server", long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "2302")]
    port: u16,

    /// Password clients must log in with
    #[arg(long, default_value = "secret")]
    password: String,

    /// Probability (0.0-1.0) of dropping each outbound datagram
    #[arg(long, default_value = "0.0")]
    drop_rate: f64,

    /// Send the parts of multi-part responses in random order
    #[arg(long)]
    shuffle_fragments: bool,

    /// Largest response body sent in a single datagram
    #[arg(long, default_value = "1024")]
    fragment_size: usize,

    /// Seconds of silence after which a client is forgotten
    #[arg(long, default_value = "45")]
    client_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.drop_rate) {
        return Err(ServerError::Config(format!(
            "drop rate {} is outside 0.0-1.0",
            args.drop_rate
        )));
    }

    let config = ServerConfig {
        password: args.password,
        drop_rate: args.drop_rate,
        shuffle_fragments: args.shuffle_fragments,
        fragment_size: args.fragment_size,
        client_timeout: Duration::from_secs(args.client_timeout),
        ..ServerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting RCon server on {}", address);
    if config.drop_rate > 0.0 {
        info!("Dropping {:.0}% of outbound datagrams", config.drop_rate * 100.0);
    }

    let mut server = Server::bind(&address, config).await?;
    let handle = server.handle();

    // Every line typed on stdin becomes a console message
    let console = {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if !line.trim().is_empty() => handle.broadcast(line),
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    let result = server.run().await;
    console.abort();
    result
}
