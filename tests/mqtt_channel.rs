//! MQTT framing over real TCP connections

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use packet_channel::channel::{LoggingInspector, PacketChannel, Received, Sent};
use packet_channel::core::framed::FramedCodec;
use packet_channel::protocol::mqtt::{packet_type, MqttFrame, MqttFrameCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.expect("connect"), accepted.expect("accept").0)
}

/// Echo every frame until the peer goes away.
async fn echo(channel: Arc<PacketChannel<TcpStream, MqttFrameCodec>>) -> usize {
    let cancel = CancellationToken::new();
    let mut echoed = 0;
    while let Received::Packet(frame) = channel.receive(&cancel).await.expect("receive") {
        channel.send(&frame, &cancel).await.expect("echo");
        echoed += 1;
    }
    echoed
}

#[tokio::test]
async fn test_mqtt_echo_over_tcp() {
    let (client_stream, server_stream) = tcp_pair().await;
    let server = Arc::new(
        PacketChannel::new(server_stream, MqttFrameCodec::new())
            .with_inspector(Arc::new(LoggingInspector)),
    );
    let client = Arc::new(PacketChannel::new(client_stream, MqttFrameCodec::new()));
    assert!(client.peer_addr().is_some());
    assert!(!client.is_secure());

    let echo_task = tokio::spawn(echo(server.clone()));

    let frames = vec![
        MqttFrame::new(packet_type::CONNECT << 4, &b"\x00\x04MQTT\x05\x02\x00\x3c"[..]),
        MqttFrame::new(packet_type::PINGREQ << 4, Vec::<u8>::new()),
        MqttFrame::new((packet_type::PUBLISH << 4) | 0x02, vec![0x5A; 20_000]),
        MqttFrame::new(packet_type::DISCONNECT << 4, Vec::<u8>::new()),
    ];

    let cancel = CancellationToken::new();
    for frame in &frames {
        let sent = client.send(frame, &cancel).await.expect("send");
        assert_eq!(sent, Sent::Written(frame.encoded_len()));
    }

    for frame in &frames {
        let echoed = client
            .receive(&cancel)
            .await
            .expect("receive")
            .into_packet()
            .expect("packet");
        assert_eq!(&echoed, frame);
    }

    client.close().await.expect("close");
    assert_eq!(echo_task.await.unwrap(), frames.len());
    assert_eq!(server.bytes_received(), client.bytes_sent());
    assert_eq!(server.bytes_sent(), client.bytes_received());
}

#[tokio::test]
async fn test_framed_client_talks_to_channel() {
    use futures::{SinkExt, StreamExt};

    let (client_stream, server_stream) = tcp_pair().await;
    let server = Arc::new(PacketChannel::new(server_stream, MqttFrameCodec::new()));
    let echo_task = tokio::spawn(echo(server));

    let mut client = Framed::new(client_stream, FramedCodec::new(MqttFrameCodec::new()));
    let frame = MqttFrame::new(packet_type::SUBSCRIBE << 4 | 0x02, vec![0x00, 0x01, 0x00]);
    client.send(frame.clone()).await.expect("send");

    let echoed = client.next().await.expect("frame").expect("decode");
    assert_eq!(echoed, frame);

    drop(client);
    assert_eq!(echo_task.await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_remaining_length_over_tcp() {
    use tokio::io::AsyncWriteExt;

    let (mut client_stream, server_stream) = tcp_pair().await;
    let server = PacketChannel::new(server_stream, MqttFrameCodec::new());

    client_stream
        .write_all(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01])
        .await
        .expect("write");

    let err = server
        .receive(&CancellationToken::new())
        .await
        .expect_err("malformed");
    assert!(matches!(
        err,
        packet_channel::ChannelError::ProtocolViolation(_)
    ));
    assert_eq!(server.state(), packet_channel::ChannelState::Closed);
}
