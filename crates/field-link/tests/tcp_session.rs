use bytes::BytesMut;
use field_link::{
    transport::{encode_frame, take_frame, MAX_FRAME_BYTES},
    ConnectionEvent, ConnectionManager, ConnectionState, DetectionFeed, Endpoint, TcpConnector, TelemetryFeed,
};
use field_proto::envelope::Envelope;
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

async fn read_one_frame(sock: &mut TcpStream) -> Envelope {
    let mut buf = BytesMut::new();
    loop {
        if let Some(body) = take_frame(&mut buf, MAX_FRAME_BYTES).unwrap() {
            return Envelope::decode(&body).unwrap();
        }
        let n = sock.read_buf(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a frame");
    }
}

fn endpoint_for(listener: &TcpListener) -> Endpoint {
    format!("tcp://{}", listener.local_addr().unwrap()).parse().unwrap()
}

#[tokio::test]
async fn detection_round_trip_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = endpoint_for(&listener);

    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let env = read_one_frame(&mut sock).await;
        assert_eq!(env.event, "process_frame");
        assert!(env.data.as_str().unwrap().starts_with("data:image/jpeg;base64,"));

        let reply = br#"{"event":"detection_results","data":{"detections":[{"box":[4,8,40,80],"label":"blight","confidence":0.91}],"image_width":640,"image_height":480}}"#;
        sock.write_all(&encode_frame(reply, MAX_FRAME_BYTES).unwrap()).await.unwrap();
        sock.shutdown().await.unwrap();
    });

    let mut link = ConnectionManager::<DetectionFeed>::new(endpoint);
    link.activate(&TcpConnector::new());
    assert_eq!(link.state(), ConnectionState::Connecting);

    let ev = timeout(Duration::from_secs(5), link.next_event()).await.unwrap();
    assert_eq!(ev, Some(ConnectionEvent::Opened));

    link.send_frame("data:image/jpeg;base64,/9j/4AAQ").unwrap();

    match timeout(Duration::from_secs(5), link.next_event()).await.unwrap() {
        Some(ConnectionEvent::Payload(batch)) => {
            assert_eq!(batch.detections.len(), 1);
            assert_eq!(batch.detections[0].label, "blight");
            assert_eq!(batch.image_size(), Some((640, 480)));
        }
        other => panic!("expected detection batch, got {:?}", other),
    }

    let ev = timeout(Duration::from_secs(5), link.next_event()).await.unwrap();
    assert_eq!(ev, Some(ConnectionEvent::Closed));
    assert_eq!(link.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_an_error_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = endpoint_for(&listener);
    drop(listener);

    let mut link = ConnectionManager::<TelemetryFeed>::new(endpoint);
    link.activate(&TcpConnector::new());

    let ev = timeout(Duration::from_secs(5), link.next_event()).await.unwrap();
    assert!(matches!(ev, Some(ConnectionEvent::Failed(_))));
    assert_eq!(link.state(), ConnectionState::Error);
    assert_eq!(link.next_event().await, None);
}

#[tokio::test]
async fn teardown_closes_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = endpoint_for(&listener);

    let mut link = ConnectionManager::<TelemetryFeed>::new(endpoint);
    link.activate(&TcpConnector::new());
    let (mut sock, _) = listener.accept().await.unwrap();
    let ev = timeout(Duration::from_secs(5), link.next_event()).await.unwrap();
    assert_eq!(ev, Some(ConnectionEvent::Opened));

    link.teardown();
    assert_eq!(link.state(), ConnectionState::Disconnected);

    // the aborted session task drops its stream, so the server sees EOF
    let mut scratch = [0u8; 16];
    let n = timeout(Duration::from_secs(5), sock.read(&mut scratch)).await.unwrap().unwrap_or(0);
    assert_eq!(n, 0);

    // anything the server still pushes goes nowhere
    let _ = sock
        .write_all(&encode_frame(br#"{"event":"health_update","data":{"plant_health_status":"Healthy"}}"#, MAX_FRAME_BYTES).unwrap())
        .await;
    assert_eq!(link.next_event().await, None);
    assert!(link.latest().is_none());
}
