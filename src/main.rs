use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;
use winet::config::DEFAULT_LOCALE;
use winet::envelope::FIELD_TOKEN;
use winet::{ClientConfig, ClientError, ConnectionEvent, Payload, WinetClient};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("--data must be a JSON object")]
    PayloadNotObject,
}

#[derive(Parser, Debug)]
#[command(name = "winet", about = "Query a WiNet device over its websocket and lookup API")]
struct Cli {
    #[arg(long, env = "WINET_HOST")]
    host: String,

    #[arg(long, env = "WINET_LOCALE", default_value = DEFAULT_LOCALE)]
    locale: String,

    #[arg(long, env = "WINET_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plant overview
    State,
    Runtime,
    Statistics,
    /// List attached devices
    Devices {
        #[arg(long = "type")]
        device_type: Option<u32>,
    },
    /// Realtime data of one device
    Real { dev_id: u32 },
    /// DC data of one device
    Direct { dev_id: u32 },
    Faults,
    System,
    /// Static metadata over HTTP
    About,
    /// Product listing over HTTP
    Products,
    /// Device parameters over HTTP
    DeviceInfo { dev_id: u32 },
    /// Device type catalog over HTTP
    DeviceTypes,
    /// Call any service; the session token is added unless --data sets one
    Call {
        service: String,
        #[arg(long)]
        data: Option<String>,
    },
}

impl Command {
    fn needs_session(&self) -> bool {
        !matches!(self, Self::About | Self::Products)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let deadline = Duration::from_secs(cli.timeout_secs);
    let config = ClientConfig::new(&cli.host).with_locale(cli.locale);
    let client = WinetClient::new(config)?;

    let value = if cli.command.needs_session() {
        open_session(&client, deadline).await?;
        let result = run_command(&client, cli.command, deadline).await;
        client.disconnect();
        result?
    } else {
        run_command(&client, cli.command, deadline).await?
    };

    print_json(&value)
}

async fn open_session(client: &WinetClient, deadline: Duration) -> Result<(), CliError> {
    let mut events = client.subscribe();
    client.connect();

    let connected = async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected) => return Ok(()),
                Ok(ConnectionEvent::Error(error)) => return Err(CliError::Connect(error.to_string())),
                Ok(ConnectionEvent::Disconnected) => {
                    return Err(CliError::Connect("closed during handshake".to_owned()));
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(CliError::Connect("event channel closed".to_owned())),
            }
        }
    };
    timeout(deadline, connected).await.map_err(|_| CliError::Timeout("connection"))??;

    timeout(deadline, client.authenticate())
        .await
        .map_err(|_| CliError::Timeout("authentication"))??;
    tracing::info!(host = %client.config().host, "session ready");
    Ok(())
}

async fn run_command(client: &WinetClient, command: Command, deadline: Duration) -> Result<Value, CliError> {
    let result = match command {
        Command::State => timeout(deadline, client.get_state()).await,
        Command::Runtime => timeout(deadline, client.get_runtime()).await,
        Command::Statistics => timeout(deadline, client.get_statistics()).await,
        Command::Devices { device_type } => timeout(deadline, client.get_device_list(device_type)).await,
        Command::Real { dev_id } => timeout(deadline, client.get_device_realtime_data(dev_id)).await,
        Command::Direct { dev_id } => timeout(deadline, client.get_device_dc_data(dev_id)).await,
        Command::Faults => timeout(deadline, client.get_faults()).await,
        Command::System => timeout(deadline, client.get_system_information()).await,
        Command::About => timeout(deadline, client.get_about()).await,
        Command::Products => timeout(deadline, client.get_products()).await,
        Command::DeviceInfo { dev_id } => timeout(deadline, client.get_device_info(dev_id)).await,
        Command::DeviceTypes => timeout(deadline, client.get_device_types()).await,
        Command::Call { service, data } => {
            let mut payload = parse_payload(data.as_deref())?;
            if !payload.contains_key(FIELD_TOKEN) {
                payload.insert(FIELD_TOKEN.to_owned(), Value::String(client.token().await));
            }
            timeout(deadline, client.call(&service, payload)).await
        }
    };

    Ok(result.map_err(|_| CliError::Timeout("reply"))??)
}

fn parse_payload(data: Option<&str>) -> Result<Payload, CliError> {
    let Some(raw) = data else {
        return Ok(Payload::new());
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::PayloadNotObject),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
