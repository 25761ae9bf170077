//! High-level meter client

use std::time::Duration;

use tracing::{debug, info, trace};

use dlt645_core::{
    ConnectionState, ControlCode, Frame, address,
    constants::{ADDRESS_LEN, IDENTIFIER_LEN},
};
use dlt645_transport::{Connection, Transport};

use crate::config::Config;
use crate::error::Result;

/// DL/T 645 meter client
///
/// One client talks to one meter over one exclusive channel. The channel is
/// opened on the first request and closed again after the configured idle
/// timeout. Clones share the channel, and concurrent requests are answered
/// one after another.
///
/// # Examples
///
/// ```no_run
/// use dlt645::{Client, Config};
///
/// #[tokio::main]
/// async fn main() -> dlt645::Result<()> {
///     let client = Client::new(Config::tcp("192.168.1.50:8899"), "202204080026")?;
///
///     // Combined active energy, total
///     let frame = client.read_data([0x00, 0x00, 0x00, 0x00]).await?;
///     println!("{}", frame);
///
///     client.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    connection: Connection<Box<dyn Transport>>,
    device_address: String,
    address: [u8; ADDRESS_LEN],
}

impl Client {
    /// Create a client; nothing is opened until the first request
    ///
    /// # Errors
    ///
    /// Returns error if the device address is not 12 decimal digits or the
    /// configuration is invalid.
    pub fn new(config: Config, device_address: impl Into<String>) -> Result<Self> {
        let transport = config.build_transport()?;
        Self::with_transport(transport, device_address, config.idle_timeout)
    }

    /// Create a client and open its channel right away
    pub async fn open(config: Config, device_address: impl Into<String>) -> Result<Self> {
        let client = Self::new(config, device_address)?;

        info!("Connecting to {}...", client.connection.remote_addr());
        client.connection.connect().await?;

        Ok(client)
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport<T: Transport + 'static>(
        transport: T,
        device_address: impl Into<String>,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let device_address = device_address.into();
        let address = address::encode(&device_address)?;

        let transport: Box<dyn Transport> = Box::new(transport);

        Ok(Self {
            connection: Connection::new(transport, idle_timeout),
            device_address,
            address,
        })
    }

    /// Send one request frame and return the decoded reply
    ///
    /// # Errors
    ///
    /// Transport failures, malformed replies and error replies from the
    /// meter are returned as-is; nothing is retried. A reply from another
    /// meter, with another identifier or with a code the request does not
    /// allow fails with `UnexpectedReply`. Malformed and unexpected replies
    /// also close the channel.
    pub async fn read(
        &self,
        control: impl Into<u8>,
        identifier: &[u8],
        payload: &[u8],
    ) -> Result<Frame> {
        let request = Frame::with_address(self.address, control, identifier, payload)?;

        trace!("Sending: {:?}", request);

        // A malformed or foreign reply means the stream is out of step
        let response = self
            .connection
            .send_checked(&request.encode(), |reply| {
                !matches!(request.decode_reply(reply), Err(e) if e.is_recoverable())
            })
            .await?;
        let frame = request.decode_reply(&response)?;

        trace!("Received: {:?}", frame);

        Ok(frame)
    }

    /// Read a data item by its identifier (control `0x11`)
    pub async fn read_data(&self, identifier: [u8; IDENTIFIER_LEN]) -> Result<Frame> {
        debug!("Reading {}...", hex::encode_upper(identifier));
        self.read(ControlCode::Read, &identifier, &[]).await
    }

    /// Fetch follow-up frame `seq` of a partial reply (control `0x12`)
    pub async fn read_follow_up(&self, identifier: [u8; IDENTIFIER_LEN], seq: u8) -> Result<Frame> {
        debug!("Reading {} follow-up #{}...", hex::encode_upper(identifier), seq);
        self.read(ControlCode::ReadFollowUp, &identifier, &[seq]).await
    }

    /// Close the channel
    ///
    /// Safe to call more than once; a later request reopens the channel.
    pub async fn close(&self) -> Result<()> {
        if self.connection.is_connected() {
            info!("Disconnecting from {}...", self.connection.remote_addr());
        }

        self.connection.close().await?;
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Device address this client talks to
    pub fn device_address(&self) -> &str {
        &self.device_address
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection<Box<dyn Transport>> {
        &self.connection
    }
}
