//! End-to-end tests against a simulated meter behind a TCP gateway

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dlt645::{Client, Config, ConnectionState, ControlCode, Error, Frame};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

const ADDRESS: &str = "202204080026";

const TOTAL_ENERGY: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
const VOLTAGE_A: [u8; 4] = [0x02, 0x01, 0x01, 0x00];
/// Never answered
const SILENT: [u8; 4] = [0xEE, 0x00, 0x00, 0x00];
/// Answered with a bad checksum
const CORRUPT: [u8; 4] = [0xCC, 0x00, 0x00, 0x00];
/// `04 nn 00 00` is answered with `nn`
const ECHO: u8 = 0x04;
/// Answered, then followed by a byte of line noise
const NOISE_AFTER: [u8; 4] = [0x05, 0x00, 0x00, 0x00];
/// Preceded by a byte of line noise, answered late
const NOISE_BEFORE: [u8; 4] = [0x06, 0x00, 0x00, 0x00];
/// Answered with the identifier of another data item
const WRONG_ID: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

struct Meter {
    endpoint: String,
    accepted: Arc<AtomicUsize>,
}

impl Meter {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket));
            }
        });

        Self { endpoint, accepted }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn config(&self) -> Config {
        Config::tcp(self.endpoint.clone()).with_timeout(Duration::from_secs(2))
    }
}

async fn serve(mut socket: TcpStream) {
    loop {
        let mut request = vec![0u8; Frame::HEADER_SIZE];
        if socket.read_exact(&mut request).await.is_err() {
            return;
        }

        let mut rest = vec![0u8; request[9] as usize + 2];
        if socket.read_exact(&mut rest).await.is_err() {
            return;
        }
        request.extend_from_slice(&rest);

        let request = Frame::decode(&request).unwrap();
        let Some(reply) = reply_for(&request) else {
            continue;
        };

        if request.identifier.as_ref() == NOISE_BEFORE {
            if socket.write_all(&[0x00]).await.is_err() {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }

        // Wake-up preamble, then the frame in two pieces
        let mut wire = vec![0xFE; 4];
        wire.extend_from_slice(&reply);
        let (head, tail) = wire.split_at(wire.len() / 2);

        if socket.write_all(head).await.is_err() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
        if socket.write_all(tail).await.is_err() {
            return;
        }

        if request.identifier.as_ref() == NOISE_AFTER {
            sleep(Duration::from_millis(5)).await;
            if socket.write_all(&[0x00]).await.is_err() {
                return;
            }
        }
    }
}

fn reply_for(request: &Frame) -> Option<Vec<u8>> {
    let id: [u8; 4] = request.identifier.as_ref().try_into().ok()?;
    let reply = |payload: &[u8]| {
        Frame::with_address(request.address, ControlCode::ReadReply, &id, payload)
            .unwrap()
            .encode()
            .to_vec()
    };

    match id {
        TOTAL_ENERGY => Some(reply(&[0x00, 0x12, 0x34, 0x56])),
        VOLTAGE_A => Some(reply(&[0x22, 0x05])),
        SILENT => None,
        CORRUPT => {
            let mut bytes = reply(&[0x01]);
            let cs = bytes.len() - 2;
            bytes[cs] = bytes[cs].wrapping_add(1);
            Some(bytes)
        }
        [ECHO, n, 0, 0] => Some(reply(&[n])),
        NOISE_AFTER | NOISE_BEFORE => Some(reply(&[0x01])),
        WRONG_ID => {
            let frame =
                Frame::with_address(request.address, ControlCode::ReadReply, &VOLTAGE_A, &[0x22]);
            Some(frame.unwrap().encode().to_vec())
        }
        _ => {
            // Status 0x02: no such data item
            let frame = Frame::with_address(request.address, ControlCode::ReadError, &[], &[0x02]);
            Some(frame.unwrap().encode().to_vec())
        }
    }
}

#[tokio::test]
async fn test_read_over_tcp() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    // Nothing is opened until the first request
    sleep(Duration::from_millis(20)).await;
    assert_eq!(meter.accepted(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let frame = client.read_data(TOTAL_ENERGY).await.unwrap();
    assert_eq!(frame.address_string().unwrap(), ADDRESS);
    assert_eq!(frame.control_code(), Some(ControlCode::ReadReply));
    assert_eq!(frame.identifier.as_ref(), &TOTAL_ENERGY);
    assert_eq!(frame.payload.as_ref(), &[0x00, 0x12, 0x34, 0x56]);

    let frame = client.read_data(VOLTAGE_A).await.unwrap();
    assert_eq!(frame.payload.as_ref(), &[0x22, 0x05]);

    // Both requests shared one channel
    assert_eq!(meter.accepted(), 1);
    assert_eq!(client.connection().session().cycles(), 2);

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_open_connects_eagerly() {
    let meter = Meter::spawn().await;
    let client = Client::open(meter.config(), ADDRESS).await.unwrap();

    assert!(client.is_connected());
    sleep(Duration::from_millis(20)).await;
    assert_eq!(meter.accepted(), 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_open_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = Client::open(Config::tcp(endpoint), ADDRESS).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_error_reply() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let err = client.read_data([0x99, 0x99, 0x00, 0x00]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Core(dlt645_core::Error::ProtocolError {
            control: 0xD1,
            status: Some(0x02)
        })
    ));
    assert!(!err.is_recoverable());

    // The channel stays usable
    assert!(client.read_data(TOTAL_ENERGY).await.is_ok());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_reply() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let err = client.read_data(CORRUPT).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(dlt645_core::Error::ChecksumMismatch { .. })
    ));
    assert!(err.is_recoverable());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_read_timeout_reconnects() {
    let meter = Meter::spawn().await;
    let config = meter.config().with_timeout(Duration::from_millis(100));
    let client = Client::new(config, ADDRESS).unwrap();

    let err = client.read_data(SILENT).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(!client.is_connected());

    let frame = client.read_data(TOTAL_ENERGY).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &TOTAL_ENERGY);
    assert_eq!(meter.accepted(), 2);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_idle_timeout_closes_channel() {
    let meter = Meter::spawn().await;
    let config = meter.config().with_idle_timeout(Duration::from_millis(100));
    let client = Client::new(config, ADDRESS).unwrap();

    client.read_data(TOTAL_ENERGY).await.unwrap();
    assert!(client.is_connected());

    sleep(Duration::from_millis(400)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Reopened on demand
    client.read_data(VOLTAGE_A).await.unwrap();
    assert_eq!(meter.accepted(), 2);
    assert_eq!(client.connection().session().connects(), 2);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_are_serialized() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let reads: Vec<_> = (0..8u8)
        .map(|n| {
            let client = client.clone();
            tokio::spawn(async move { (n, client.read_data([ECHO, n, 0, 0]).await) })
        })
        .collect();

    for read in reads {
        let (n, result) = read.await.unwrap();
        let frame = result.unwrap();
        assert_eq!(frame.identifier.as_ref(), &[ECHO, n, 0, 0]);
        assert_eq!(frame.payload.as_ref(), &[n]);
    }

    assert_eq!(meter.accepted(), 1);
    assert_eq!(client.connection().session().cycles(), 8);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_noise_after_reply_is_discarded() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let frame = client.read_data(NOISE_AFTER).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &NOISE_AFTER);

    // Let the stray byte land in the socket
    sleep(Duration::from_millis(50)).await;

    let frame = client.read_data(TOTAL_ENERGY).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &TOTAL_ENERGY);

    let frame = client.read_data(VOLTAGE_A).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &VOLTAGE_A);

    assert_eq!(meter.accepted(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_noise_before_reply_resets_channel() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let err = client.read_data(NOISE_BEFORE).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(dlt645_core::Error::FrameTooShort { actual: 1, .. })
    ));
    assert!(err.is_recoverable());
    assert!(!client.is_connected());

    // The late reply is left behind on the old channel
    sleep(Duration::from_millis(50)).await;

    let frame = client.read_data(TOTAL_ENERGY).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &TOTAL_ENERGY);

    let frame = client.read_data(VOLTAGE_A).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &VOLTAGE_A);

    assert_eq!(meter.accepted(), 2);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_reply_for_other_identifier() {
    let meter = Meter::spawn().await;
    let client = Client::new(meter.config(), ADDRESS).unwrap();

    let err = client.read_data(WRONG_ID).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(dlt645_core::Error::UnexpectedReply(_))
    ));
    assert!(!client.is_connected());

    let frame = client.read_data(TOTAL_ENERGY).await.unwrap();
    assert_eq!(frame.identifier.as_ref(), &TOTAL_ENERGY);
    assert_eq!(meter.accepted(), 2);

    client.close().await.unwrap();
}
