//! Exclusive, self-managing connection
//!
//! [`Connection`] wraps any [`Transport`] and adds:
//! - one request/response cycle at a time (callers queue on an async lock)
//! - connect on first use and after the channel was closed
//! - an idle timer that closes the channel after a period without traffic
//!
//! ```text
//!                 send() / connect()
//!  Disconnected ───────────────────────▶ Connected
//!       ▲                                   │
//!       └──── idle timeout / close() ───────┘
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

use dlt645_core::{ConnectionState, Session};

use crate::{Transport, error::*};

/// Shared handle to one exclusive transport
///
/// Cloning is cheap; all clones drive the same channel.
pub struct Connection<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    link: Mutex<Link<T>>,
    session: Session,
    idle_timeout: Option<Duration>,
    endpoint: String,
}

struct Link<T> {
    transport: T,
    last_activity: Instant,
    idle_timer: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> Connection<T> {
    /// Wrap a transport. A zero `idle_timeout` keeps the channel open until
    /// [`close`](Self::close) is called.
    pub fn new(transport: T, idle_timeout: Duration) -> Self {
        let endpoint = transport.remote_addr();

        Self {
            shared: Arc::new(Shared {
                link: Mutex::new(Link {
                    transport,
                    last_activity: Instant::now(),
                    idle_timer: None,
                }),
                session: Session::new(),
                idle_timeout: (!idle_timeout.is_zero()).then_some(idle_timeout),
                endpoint,
            }),
        }
    }

    /// Open the channel now instead of on the first send
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.shared.link.lock().await;

        self.shared.open(&mut link).await?;
        link.last_activity = Instant::now();
        arm_idle_timer(&self.shared, &mut link);

        Ok(())
    }

    /// Run one request/response cycle
    ///
    /// Connects first if needed. Transport errors are returned unchanged;
    /// when they leave the channel in an unknown state it is closed, and the
    /// next call reconnects.
    pub async fn send(&self, data: &[u8]) -> Result<BytesMut> {
        self.send_checked(data, |_| true).await
    }

    /// Run one request/response cycle and vet the reply under the same lock
    ///
    /// When `in_step` rejects the reply the stream can no longer be trusted
    /// to pair requests with replies, so the channel is closed before the
    /// lock is released. The reply is still returned for the caller to
    /// report.
    pub async fn send_checked<F>(&self, data: &[u8], in_step: F) -> Result<BytesMut>
    where
        F: FnOnce(&[u8]) -> bool,
    {
        let mut link = self.shared.link.lock().await;

        self.shared.open(&mut link).await?;
        link.last_activity = Instant::now();

        let result = link.transport.send(data).await;

        link.last_activity = Instant::now();

        let rejected = result.as_ref().is_ok_and(|reply| !in_step(&reply[..]));

        match &result {
            Ok(_) if rejected => {
                warn!("Closing {} after out-of-step reply", self.shared.endpoint);
                if let Err(close_err) = self.shared.close_link(&mut link).await {
                    debug!("Close after bad reply also failed: {}", close_err);
                }
            }
            Ok(_) => {
                let cycles = self.shared.session.record_cycle();
                trace!("Cycle {} on {} complete", cycles, self.shared.endpoint);
                arm_idle_timer(&self.shared, &mut link);
            }
            Err(e) if e.requires_reconnect() => {
                warn!("Closing {} after failed cycle: {}", self.shared.endpoint, e);
                if let Err(close_err) = self.shared.close_link(&mut link).await {
                    debug!("Close after failure also failed: {}", close_err);
                }
            }
            Err(_) => arm_idle_timer(&self.shared, &mut link),
        }

        result
    }

    /// Close the channel and cancel the idle timer
    ///
    /// Safe to call any number of times.
    pub async fn close(&self) -> Result<()> {
        let mut link = self.shared.link.lock().await;
        self.shared.close_link(&mut link).await
    }

    /// Current link state
    pub fn state(&self) -> ConnectionState {
        self.shared.session.state()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.shared.session.is_connected()
    }

    /// Connection statistics
    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    /// Idle-disconnect timeout, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.shared.idle_timeout
    }

    /// Get remote address
    pub fn remote_addr(&self) -> &str {
        &self.shared.endpoint
    }
}

impl<T: Transport + 'static> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport + 'static> Shared<T> {
    async fn open(&self, link: &mut Link<T>) -> Result<()> {
        if link.transport.is_connected() {
            return Ok(());
        }

        debug!("Connecting to {}...", self.endpoint);

        link.transport.connect().await?;
        self.session.connected();

        debug!("Connected to {} (connect #{})", self.endpoint, self.session.connects());
        Ok(())
    }

    async fn close_link(&self, link: &mut Link<T>) -> Result<()> {
        if let Some(timer) = link.idle_timer.take() {
            timer.abort();
        }

        let result = if link.transport.is_connected() {
            debug!("Closing connection to {}", self.endpoint);
            link.transport.close().await
        } else {
            Ok(())
        };

        self.session.close();
        result
    }
}

/// Replace any pending idle timer with a fresh one
fn arm_idle_timer<T: Transport + 'static>(shared: &Arc<Shared<T>>, link: &mut Link<T>) {
    let Some(idle_timeout) = shared.idle_timeout else {
        return;
    };

    if let Some(timer) = link.idle_timer.take() {
        timer.abort();
    }

    let weak = Arc::downgrade(shared);
    link.idle_timer = Some(tokio::spawn(close_when_idle(weak, idle_timeout)));
}

async fn close_when_idle<T: Transport + 'static>(shared: Weak<Shared<T>>, idle_timeout: Duration) {
    sleep(idle_timeout).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };

    let mut link = shared.link.lock().await;

    // Traffic may have slipped in while this task waited for the lock
    let idle = link.last_activity.elapsed();
    if idle < idle_timeout {
        return;
    }

    // Detach our own handle so close_link does not abort this task
    drop(link.idle_timer.take());

    debug!("Closing {} due to idle timeout: {:?}", shared.endpoint, idle);
    if let Err(e) = shared.close_link(&mut link).await {
        warn!("Idle close of {} failed: {}", shared.endpoint, e);
    }
}
