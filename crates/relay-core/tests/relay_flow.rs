//! End-to-end tests driving a live channel over real TCP sockets: a test
//! source dials the listener, frames flow through the ledger, decisions are
//! applied through the gates, and the destination observes the wire bytes.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use relay_core::{Channel, Intercepted, SequenceCounter, REVIEW_FEED_CAPACITY};

const WAIT: Duration = Duration::from_secs(5);

/// Reserve a port by binding to an ephemeral one and releasing it.
async fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// The channel's listener binds asynchronously after spawn, so the first
/// connect attempts may be refused.
async fn connect_with_retry(port: u16) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("could not connect to 127.0.0.1:{port}");
}

async fn next_intercepted(rx: &mut mpsc::Receiver<Intercepted>) -> Intercepted {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an intercepted message")
        .expect("review feed closed")
}

#[tokio::test]
async fn rejected_messages_vanish_and_accepted_ones_reach_the_wire() {
    let src = free_port().await;
    let dst = free_port().await;
    // The destination must listen before the dialer's first attempt or the
    // outbound flow backs off for ten seconds.
    let destination = TcpListener::bind(("127.0.0.1", dst)).await.unwrap();

    let (review_tx, mut review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);
    let counter = SequenceCounter::new();
    let channel = Channel::spawn("test".to_string(), src, dst, counter, review_tx);

    let mut source = connect_with_retry(src).await;
    source.write_all(&[0, 0, 0, 1, b'x']).await.unwrap();
    source
        .write_all(&[0, 0, 0, 3, b'a', b'b', b'c'])
        .await
        .unwrap();

    let first = next_intercepted(&mut review_rx).await;
    let second = next_intercepted(&mut review_rx).await;

    assert_eq!(&first.message.payload[..], b"x");
    assert_eq!(&second.message.payload[..], b"abc");
    assert_eq!(second.message.sequence, first.message.sequence + 1);
    assert_eq!(first.message.source, src.to_string());
    assert_eq!(first.message.destination, dst.to_string());

    first.gate.reject().await;
    second.gate.accept().await;

    let (mut delivered, _) = timeout(WAIT, destination.accept()).await.unwrap().unwrap();
    let mut wire = [0u8; 7];
    timeout(WAIT, delivered.read_exact(&mut wire))
        .await
        .unwrap()
        .unwrap();
    // Only the accepted frame appears, byte for byte.
    assert_eq!(wire, [0, 0, 0, 3, b'a', b'b', b'c']);

    timeout(WAIT, channel.close()).await.expect("close hung");
}

#[tokio::test]
async fn duplicate_accept_does_not_deliver_twice() {
    let src = free_port().await;
    let dst = free_port().await;
    let destination = TcpListener::bind(("127.0.0.1", dst)).await.unwrap();

    let (review_tx, mut review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);
    let channel = Channel::spawn(
        "dup".to_string(),
        src,
        dst,
        SequenceCounter::new(),
        review_tx,
    );

    let mut source = connect_with_retry(src).await;
    source.write_all(&[0, 0, 0, 2, b'h', b'i']).await.unwrap();

    let intercepted = next_intercepted(&mut review_rx).await;
    intercepted.gate.accept().await;
    intercepted.gate.accept().await;

    let (mut delivered, _) = timeout(WAIT, destination.accept()).await.unwrap().unwrap();
    let mut wire = [0u8; 6];
    timeout(WAIT, delivered.read_exact(&mut wire))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wire, [0, 0, 0, 2, b'h', b'i']);

    // No second frame follows the duplicate accept.
    let mut extra = [0u8; 1];
    let second_read = timeout(Duration::from_millis(300), delivered.read(&mut extra)).await;
    assert!(
        second_read.is_err() || matches!(second_read, Ok(Ok(0))),
        "duplicate accept must not emit a second frame"
    );

    timeout(WAIT, channel.close()).await.expect("close hung");
}

#[tokio::test]
async fn sequence_numbers_have_no_gaps_within_a_connection() {
    let src = free_port().await;
    let dst = free_port().await;
    let _destination = TcpListener::bind(("127.0.0.1", dst)).await.unwrap();

    let (review_tx, mut review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);
    let channel = Channel::spawn(
        "seq".to_string(),
        src,
        dst,
        SequenceCounter::new(),
        review_tx,
    );

    let mut source = connect_with_retry(src).await;
    for i in 0..10u8 {
        source.write_all(&[0, 0, 0, 1, b'0' + i]).await.unwrap();
    }

    let mut sequences = Vec::new();
    for _ in 0..10 {
        sequences.push(next_intercepted(&mut review_rx).await.message.sequence);
    }
    let expected: Vec<u64> = (sequences[0]..sequences[0] + 10).collect();
    assert_eq!(sequences, expected);

    timeout(WAIT, channel.close()).await.expect("close hung");
}

#[tokio::test]
async fn oversize_frame_terminates_the_connection_but_not_the_channel() {
    let src = free_port().await;
    let dst = free_port().await;
    let _destination = TcpListener::bind(("127.0.0.1", dst)).await.unwrap();

    let (review_tx, mut review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);
    let channel = Channel::spawn(
        "oversize".to_string(),
        src,
        dst,
        SequenceCounter::new(),
        review_tx,
    );

    // Declare 64 KiB, twice the limit.  The relay drops this connection.
    let mut rogue = connect_with_retry(src).await;
    rogue.write_all(&[0, 1, 0, 0]).await.unwrap();
    let mut probe = [0u8; 1];
    let closed = timeout(WAIT, rogue.read(&mut probe)).await;
    assert!(
        matches!(closed, Ok(Ok(0)) | Ok(Err(_))),
        "relay should drop a non-conforming connection"
    );

    // A well-behaved reconnect still relays.
    let mut source = connect_with_retry(src).await;
    source.write_all(&[0, 0, 0, 1, b'k']).await.unwrap();
    let intercepted = next_intercepted(&mut review_rx).await;
    assert_eq!(&intercepted.message.payload[..], b"k");

    timeout(WAIT, channel.close()).await.expect("close hung");
}

#[tokio::test]
async fn close_is_bounded_with_live_connections_and_pending_messages() {
    let src = free_port().await;
    let dst = free_port().await;
    let _destination = TcpListener::bind(("127.0.0.1", dst)).await.unwrap();

    let (review_tx, mut review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);
    let channel = Channel::spawn(
        "teardown".to_string(),
        src,
        dst,
        SequenceCounter::new(),
        review_tx,
    );

    let mut source = connect_with_retry(src).await;
    source.write_all(&[0, 0, 0, 1, b'p']).await.unwrap();
    let pending = next_intercepted(&mut review_rx).await;
    assert_eq!(channel.ledger().pending_len(), 1);

    // Close with the source connected and a message still undecided.
    timeout(WAIT, channel.close()).await.expect("close hung");

    // The abandoned gate stays callable and is a harmless no-op.
    pending.gate.accept().await;
}
