//! `zigate` - talk to a ZiGate coordinator from the command line.
//!
//! Opens the coordinator, reports its firmware version and network, and
//! optionally permits joining and logs network events until Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zigate_driver::{Driver, DriverConfig, DriverError, DriverEvent};
use zigate_protocol::Message;

/// ZiGate coordinator runner.
#[derive(Parser, Debug)]
#[command(name = "zigate", version, about)]
struct Args {
    /// Serial device path or host:port of the coordinator.
    #[arg(short, long)]
    address: Option<String>,

    /// Serial line speed, overriding the configuration.
    #[arg(long)]
    baud_rate: Option<u32>,

    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Permit joining for this many seconds (255 keeps it open).
    #[arg(long, value_name = "SECONDS")]
    permit_join: Option<u8>,

    /// Log network events until interrupted.
    #[arg(long)]
    listen: bool,
}

impl Args {
    fn driver_config(&self) -> Result<DriverConfig, DriverError> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::from_file(path)?,
            None => DriverConfig::default(),
        };
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        config.validate()?;
        Ok(config)
    }
}

fn describe_message(message: &Message) -> String {
    format!("{} (0x{:04X}) {}", message.name, message.code, message.payload)
}

fn describe_event(event: &DriverEvent) -> String {
    match event {
        DriverEvent::Received(message) => {
            let data = message
                .payload
                .get("data")
                .and_then(|value| value.as_bytes())
                .map(hex::encode)
                .unwrap_or_default();
            format!(
                "received cluster 0x{:04X} from 0x{:04X}: {}",
                message.get_u64("cluster_id").unwrap_or_default(),
                message.get_u64("source_address").unwrap_or_default(),
                data
            )
        }
        DriverEvent::DeviceJoined {
            short_address,
            extended_address,
        } => format!(
            "device joined: 0x{:04X} ({})",
            short_address,
            hex::encode(extended_address.to_be_bytes())
        ),
        DriverEvent::DeviceLeft(message) => format!(
            "device left: {}",
            hex::encode(message.get_u64("extended_address").unwrap_or_default().to_be_bytes())
        ),
        DriverEvent::Closed => "link closed".to_string(),
    }
}

async fn run(args: Args) -> Result<(), DriverError> {
    let config = args.driver_config()?;
    let driver = Driver::new(config);
    let mut events = driver.subscribe();

    driver.open().await?;

    let version = driver.version().await?;
    info!("Firmware: {}", describe_message(&version));
    let network = driver.network_state().await?;
    info!("Network: {}", describe_message(&network));

    if let Some(seconds) = args.permit_join {
        driver.permit_join(seconds).await?;
        info!("Permitting join for {}s", seconds);
    }

    if args.listen {
        info!("Listening for events, Ctrl-C to stop");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(DriverEvent::Closed) => {
                        warn!("Coordinator link closed");
                        return Ok(());
                    }
                    Ok(event) => info!("{}", describe_event(&event)),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dropped {} events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    driver.close().await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zigate_protocol::{Payload, MSG_DATA_INDICATION, MSG_LEAVE_INDICATION};

    #[test]
    fn test_address_overrides_config() {
        let args = Args::parse_from(["zigate", "--address", "10.0.0.2:9999", "--listen"]);
        assert!(args.listen);
        let config = args.driver_config().unwrap();
        assert_eq!(config.address, "10.0.0.2:9999");
        assert_eq!(config.command_timeout_ms, 10_000);
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn test_baud_rate_override() {
        let args = Args::parse_from(["zigate", "-a", "/dev/ttyUSB0", "--baud-rate", "38400"]);
        assert_eq!(args.driver_config().unwrap().baud_rate, 38_400);
    }

    #[test]
    fn test_missing_address_is_an_error() {
        let args = Args::parse_from(["zigate"]);
        assert!(matches!(args.driver_config(), Err(DriverError::Config(_))));
    }

    #[test]
    fn test_permit_join_range() {
        let args = Args::parse_from(["zigate", "-a", "/dev/ttyUSB0", "--permit-join", "60"]);
        assert_eq!(args.permit_join, Some(60));
        assert!(Args::try_parse_from(["zigate", "--permit-join", "300"]).is_err());
    }

    #[test]
    fn test_describe_events() {
        let joined = DriverEvent::DeviceJoined {
            short_address: 0x1234,
            extended_address: 0x00124B0001ABCDEF,
        };
        assert_eq!(describe_event(&joined), "device joined: 0x1234 (00124b0001abcdef)");

        let received = Message::new(
            MSG_DATA_INDICATION,
            Payload::new()
                .with("cluster_id", 0x0006u16)
                .with("source_address", 0x4321u16)
                .with("data", vec![0x18, 0x01]),
        )
        .unwrap();
        assert_eq!(
            describe_event(&DriverEvent::Received(received)),
            "received cluster 0x0006 from 0x4321: 1801"
        );

        let left = Message::new(
            MSG_LEAVE_INDICATION,
            Payload::new().with("extended_address", 1u64),
        )
        .unwrap();
        assert_eq!(
            describe_event(&DriverEvent::DeviceLeft(left)),
            "device left: 0000000000000001"
        );
        assert_eq!(describe_event(&DriverEvent::Closed), "link closed");
    }
}
