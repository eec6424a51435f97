//! ZiGate Driver
//!
//! Host-side driver for a ZiGate Zigbee coordinator. It owns one transport
//! session (serial device or TCP socket), serializes commands, and correlates
//! each command with its status confirmation and response messages.
//!
//! # Example
//!
//! ```rust,ignore
//! use zigate_driver::{Driver, DriverConfig, DriverEvent};
//!
//! let driver = Driver::new(DriverConfig::new("/dev/ttyUSB0"));
//! driver.open().await?;
//!
//! let version = driver.version().await?;
//! driver.permit_join(60).await?;
//!
//! let mut events = driver.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let DriverEvent::DeviceJoined { short_address, .. } = event {
//!         println!("joined: 0x{:04X}", short_address);
//!     }
//! }
//! ```

mod config;
mod driver;
mod error;
mod matcher;
mod queue;
mod transport;
mod waiter;

pub use config::DriverConfig;
pub use driver::{ConnectionState, Driver, DriverEvent, SendOptions};
pub use error::{CommandError, ConfigError, DriverError, Result};
pub use matcher::{Matcher, MessagePolicy};
pub use queue::{CommandQueue, Drained};
pub use transport::{Session, SessionEvent, TransportKind};
pub use waiter::{first_of, WaitError, WaitHandle, WaitPolicy, WaiterRegistry, Waiting};

pub use zigate_protocol as protocol;
