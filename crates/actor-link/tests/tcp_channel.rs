//! End-to-end tests: a channel over real TCP against a scripted acceptor.
//!
//! The peer side is driven by hand on a raw `TcpListener` so these tests
//! observe the actual bytes a channel puts on the wire.

use std::time::Duration;

use actor_link::{
    ActorIdentity, ChannelConfig, ChannelError, ChannelEvent, ChannelState, ConnectorChannel,
    Frame, TcpConnector, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn local() -> ActorIdentity {
    ActorIdentity::new("A", "a1")
}

fn peer_identity() -> ActorIdentity {
    ActorIdentity::new("B", "b1")
}

fn app_frame(payload: &[u8]) -> Frame {
    Frame::Application {
        opcode: 0x10,
        payload: payload.to_vec(),
    }
}

/// Read one length-prefixed frame off the socket, prefix included.
async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0_u8; 4 + len];
    buf[..4].copy_from_slice(&len_buf);
    stream.read_exact(&mut buf[4..]).await.ok()?;
    Some(buf)
}

/// Accept one connection and answer its Hello with a Welcome.
async fn accept_and_welcome(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.expect("accept failed");

    let hello = read_frame(&mut stream).await.expect("no hello frame");
    match Frame::decode(&hello).expect("undecodable hello").0 {
        Frame::Hello(payload) => {
            let id = ActorIdentity::decode(&payload).expect("unreadable identity");
            assert_eq!(id, local());
        }
        other => panic!("expected hello, got {:?}", other),
    }

    let welcome = Frame::Welcome(peer_identity().encode().unwrap().to_vec());
    stream.write_all(&welcome.encode()).await.expect("welcome write failed");
    stream
}

#[tokio::test]
async fn test_handshake_and_data_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let mut stream = accept_and_welcome(&listener).await;

        // Expect one application frame from the channel, then answer with
        // one of our own.
        let inbound = read_frame(&mut stream).await.expect("no app frame");
        assert_eq!(
            Frame::decode(&inbound).unwrap().0,
            app_frame(b"to-peer")
        );
        stream
            .write_all(&app_frame(b"from-peer").encode())
            .await
            .unwrap();

        // Hold the connection until the channel hangs up.
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    });

    let channel = ConnectorChannel::new(
        local(),
        addr,
        TcpConnector::new(addr),
        ChannelConfig::default(),
    );
    let mut events = channel.open().await.expect("open failed");

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Connected { remote, .. } => assert_eq!(remote, peer_identity()),
        other => panic!("expected connected event, got {:?}", other),
    }
    assert!(channel.active());

    channel
        .send("B", "b1", app_frame(b"to-peer").encode())
        .expect("send failed");

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Data { frame, remote, .. } => {
            assert_eq!(remote, peer_identity());
            assert_eq!(Frame::decode(&frame).unwrap().0, app_frame(b"from-peer"));
        }
        other => panic!("expected data event, got {:?}", other),
    }

    channel.close();
    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Disconnected { remote, .. } => {
            assert_eq!(remote, Some(peer_identity()));
        }
        other => panic!("expected disconnected event, got {:?}", other),
    }

    timeout(WAIT, peer).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_keepalive_ping_visible_on_the_wire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let mut stream = accept_and_welcome(&listener).await;

        // Answer pings for a while; the channel must stay up well past
        // several keep-alive timeout windows.
        let mut pings = 0_u32;
        while pings < 5 {
            let frame = read_frame(&mut stream).await.expect("peer read failed");
            if Frame::decode(&frame).unwrap().0 == Frame::Ping {
                pings += 1;
                stream.write_all(&Frame::Pong.encode()).await.unwrap();
            }
        }
        stream
    });

    let config = ChannelConfig {
        keepalive_interval: Duration::from_millis(100),
        keepalive_timeout: Duration::from_millis(500),
        ..ChannelConfig::default()
    };
    let channel = ConnectorChannel::new(local(), addr, TcpConnector::new(addr), config);
    let mut events = channel.open().await.expect("open failed");

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Connected { .. } => {}
        other => panic!("expected connected event, got {:?}", other),
    }

    // Five answered pings take ~500 ms; the channel must still be active
    // once the peer has seen them all.
    let _stream = timeout(WAIT, peer).await.unwrap().unwrap();
    assert!(channel.active());
    channel.close();
}

#[tokio::test]
async fn test_unanswered_ping_closes_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let mut stream = accept_and_welcome(&listener).await;
        // Keep reading so the socket stays open, but never answer.
        while read_frame(&mut stream).await.is_some() {}
    });

    let config = ChannelConfig {
        keepalive_interval: Duration::from_millis(100),
        keepalive_timeout: Duration::from_millis(400),
        ..ChannelConfig::default()
    };
    let channel = ConnectorChannel::new(local(), addr, TcpConnector::new(addr), config);
    let mut events = channel.open().await.expect("open failed");

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Connected { .. } => {}
        other => panic!("expected connected event, got {:?}", other),
    }

    // First ping at ~100 ms, pong deadline 400 ms later.
    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Disconnected { remote, .. } => {
            assert_eq!(remote, Some(peer_identity()));
        }
        other => panic!("expected disconnected event, got {:?}", other),
    }
    assert_eq!(channel.state(), ChannelState::Closed);

    timeout(WAIT, peer).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_peer_hangup_tears_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let stream = accept_and_welcome(&listener).await;
        drop(stream);
    });

    let channel = ConnectorChannel::new(
        local(),
        addr,
        TcpConnector::new(addr),
        ChannelConfig::default(),
    );
    let mut events = channel.open().await.expect("open failed");

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Connected { .. } => {}
        other => panic!("expected connected event, got {:?}", other),
    }

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ChannelEvent::Disconnected { remote, .. } => {
            assert_eq!(remote, Some(peer_identity()));
        }
        other => panic!("expected disconnected event, got {:?}", other),
    }
    assert!(!channel.active());

    timeout(WAIT, peer).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connect_refused_surfaces_from_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = ConnectorChannel::new(
        local(),
        addr,
        TcpConnector::new(addr),
        ChannelConfig::default(),
    );
    let result = channel.open().await;
    assert!(matches!(
        result,
        Err(ChannelError::Transport(TransportError::Io(_)))
    ));
    assert_eq!(channel.state(), ChannelState::Closed);
}
