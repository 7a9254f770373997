//! 루프백으로 실제 서버를 띄워 페어링과 릴레이를 검증하는 통합 테스트
//!
//! 같은 호스트에서 접속하는 두 클라이언트는 같은 공인 주소를 공유하므로
//! 항상 같은 룸으로 페어링됨

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::time::timeout;

use zdp::message::{
    read_message, write_message, BatchAnnounceMessage, FileChunkMessage, FileOfferMessage, Message,
};
use zdp::session::{SessionEvent, SessionEventReceiver};
use zdp::{Config, DropClient, RelayServer, SessionPhase, StagedFile};

async fn start_server() -> SocketAddr {
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), Config::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn next_event(rx: &mut SessionEventReceiver) -> SessionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event timeout")
        .expect("event channel closed")
}

async fn expect_pairing_found(rx: &mut SessionEventReceiver) {
    loop {
        if let SessionEvent::PairingFound = next_event(rx).await {
            return;
        }
    }
}

#[tokio::test]
async fn test_two_clients_pair_and_transfer_batch() {
    let addr = start_server().await;

    let (sender, mut sender_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    let (receiver, mut receiver_events) =
        DropClient::connect(addr, Config::default()).await.unwrap();

    // 루프백의 두 연결은 같은 룸, 양쪽 모두 pairing-found
    expect_pairing_found(&mut sender_events).await;
    expect_pairing_found(&mut receiver_events).await;

    // 10바이트 + 0바이트 배치
    let payload: Vec<u8> = (0u8..10).collect();
    sender
        .stage_files(vec![
            StagedFile::from_bytes("a.bin", "application/octet-stream", Bytes::from(payload.clone())),
            StagedFile::from_bytes("b.bin", "application/octet-stream", Bytes::new()),
        ])
        .await
        .unwrap();
    sender.send_staged().await.unwrap();

    // 수신측: FileCompleted 2회 후 BatchComplete 1회, 오퍼 순서 보존
    let mut file_events = 0;
    let files = loop {
        match next_event(&mut receiver_events).await {
            SessionEvent::FileCompleted { .. } => file_events += 1,
            SessionEvent::BatchComplete(files) => break files,
            SessionEvent::PhaseChanged(_) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    };

    assert_eq!(file_events, 2);
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "a.bin");
    assert_eq!(files[0].data.as_ref(), payload.as_slice());
    assert_eq!(files[1].name, "b.bin");
    assert_eq!(files[1].data.len(), 0);

    // 송신측은 sending을 거쳐 complete에 도달
    loop {
        if let SessionEvent::PhaseChanged(SessionPhase::Complete) =
            next_event(&mut sender_events).await
        {
            break;
        }
    }

    let stats = sender.stats();
    assert_eq!(stats.files_sent, 2);
    assert_eq!(stats.bytes_sent, 10);
    let stats = receiver.stats();
    assert_eq!(stats.files_received, 2);
    assert_eq!(stats.batches_completed, 1);
}

#[tokio::test]
async fn test_large_file_survives_chunking() {
    let addr = start_server().await;

    let (sender, mut sender_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    let (_receiver, mut receiver_events) =
        DropClient::connect(addr, Config::default()).await.unwrap();

    expect_pairing_found(&mut sender_events).await;
    expect_pairing_found(&mut receiver_events).await;

    // 청크 경계를 걸치는 크기 (16KB * 5 + 1)
    let payload: Vec<u8> = (0..255u8).cycle().take(5 * 16 * 1024 + 1).collect();
    sender
        .stage_files(vec![StagedFile::from_bytes(
            "big.bin",
            "application/octet-stream",
            Bytes::from(payload.clone()),
        )])
        .await
        .unwrap();
    sender.send_staged().await.unwrap();

    let files = loop {
        match next_event(&mut receiver_events).await {
            SessionEvent::BatchComplete(files) => break files,
            _ => {}
        }
    };
    assert_eq!(files[0].data.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn test_disconnect_mid_transfer_abandons_file() {
    let addr = start_server().await;

    // 송신측은 와이어 수준 제어를 위해 raw 연결 사용
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let (_receiver, mut receiver_events) =
        DropClient::connect(addr, Config::default()).await.unwrap();

    // raw 쪽도 pairing-found 프레임을 받아야 함
    loop {
        let msg = timeout(Duration::from_secs(5), read_message(&mut raw, 1024 * 1024))
            .await
            .expect("raw read timeout")
            .unwrap();
        if msg == Message::PairingFound {
            break;
        }
    }
    expect_pairing_found(&mut receiver_events).await;

    // 100바이트 선언 후 40바이트만 보내고 연결 종료
    write_message(&mut raw, &Message::BatchAnnounce(BatchAnnounceMessage { count: 1 }))
        .await
        .unwrap();
    write_message(
        &mut raw,
        &Message::FileOffer(FileOfferMessage::new("partial.bin", 100, "application/octet-stream")),
    )
    .await
    .unwrap();
    write_message(
        &mut raw,
        &Message::FileChunk(FileChunkMessage { buffer: vec![0u8; 40] }),
    )
    .await
    .unwrap();
    drop(raw);

    // 수신측: 중단된 파일은 완료되지 않고 pairing-lost로 전송 폐기
    loop {
        match next_event(&mut receiver_events).await {
            SessionEvent::PairingLost => break,
            SessionEvent::FileCompleted { .. } | SessionEvent::BatchComplete(_) => {
                panic!("interrupted file must not complete")
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_session_reset_is_relayed() {
    let addr = start_server().await;

    let (sender, mut sender_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    let (_receiver, mut receiver_events) =
        DropClient::connect(addr, Config::default()).await.unwrap();

    expect_pairing_found(&mut sender_events).await;
    expect_pairing_found(&mut receiver_events).await;

    sender
        .stage_files(vec![StagedFile::from_bytes(
            "a.txt",
            "text/plain",
            Bytes::from_static(b"payload"),
        )])
        .await
        .unwrap();
    sender.send_staged().await.unwrap();

    // 수신측이 배치를 끝내면 complete 상태
    loop {
        if let SessionEvent::BatchComplete(_) = next_event(&mut receiver_events).await {
            break;
        }
    }

    // 송신측 리셋 → 수신측도 idle로 복귀
    sender.reset_session().await.unwrap();
    loop {
        if let SessionEvent::PhaseChanged(SessionPhase::Idle) =
            next_event(&mut receiver_events).await
        {
            break;
        }
    }
}

#[tokio::test]
async fn test_reset_mid_batch_stops_sender_pump() {
    let addr = start_server().await;

    // 파일 사이 휴지를 길게 잡아 첫 파일 직후 리셋이 끼어들 틈을 만듦
    let sender_config = Config {
        inter_file_pause_ms: 800,
        ..Config::default()
    };
    let (sender, mut sender_events) = DropClient::connect(addr, sender_config).await.unwrap();
    let (receiver, mut receiver_events) =
        DropClient::connect(addr, Config::default()).await.unwrap();

    expect_pairing_found(&mut sender_events).await;
    expect_pairing_found(&mut receiver_events).await;

    sender
        .stage_files(vec![
            StagedFile::from_bytes("first.bin", "application/octet-stream", Bytes::from(vec![1u8; 64])),
            StagedFile::from_bytes("second.bin", "application/octet-stream", Bytes::from(vec![2u8; 64])),
        ])
        .await
        .unwrap();
    sender.send_staged().await.unwrap();

    // 첫 파일 완료 직후 수신측이 리셋
    loop {
        if let SessionEvent::FileCompleted { file, .. } = next_event(&mut receiver_events).await {
            assert_eq!(file.name, "first.bin");
            break;
        }
    }
    receiver.reset_session().await.unwrap();

    // 휴지 구간이 끝나도 두 번째 파일은 도착하지 않아야 함
    let quiet = timeout(Duration::from_secs(2), async {
        loop {
            match receiver_events.recv().await {
                Some(SessionEvent::FileCompleted { file, .. }) => {
                    panic!("received '{}' after reset", file.name)
                }
                Some(SessionEvent::BatchComplete(_)) => panic!("batch completed after reset"),
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    assert!(quiet.is_err(), "event channel closed unexpectedly");

    // 중단된 파일은 송신 통계에도 집계되지 않음
    let stats = sender.stats();
    assert_eq!(stats.files_sent, 1);
    assert_eq!(stats.bytes_sent, 64);
}

#[tokio::test]
async fn test_unrelayed_frames_not_counted() {
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), Config::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let stats = server.stats_handle();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // 혼자 있는 룸: 프레임을 보내도 전달 상대가 없음
    let (alone, mut alone_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    alone
        .stage_files(vec![StagedFile::from_bytes(
            "a.bin",
            "application/octet-stream",
            Bytes::from_static(b"x"),
        )])
        .await
        .unwrap();
    alone.send_staged().await.unwrap();
    loop {
        if let SessionEvent::PhaseChanged(SessionPhase::Complete) =
            next_event(&mut alone_events).await
        {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let s = stats.read();
        assert_eq!(s.relayed_messages, 0);
        assert_eq!(s.relayed_bytes, 0);
    }

    // 피어가 들어온 뒤의 프레임은 집계됨
    let (_peer, mut peer_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    expect_pairing_found(&mut alone_events).await;
    expect_pairing_found(&mut peer_events).await;

    alone.reset_session().await.unwrap();
    alone
        .stage_files(vec![StagedFile::from_bytes(
            "b.bin",
            "application/octet-stream",
            Bytes::from_static(b"y"),
        )])
        .await
        .unwrap();
    alone.send_staged().await.unwrap();
    loop {
        if let SessionEvent::BatchComplete(_) = next_event(&mut peer_events).await {
            break;
        }
    }

    let s = stats.read();
    // reset + batch-announce + offer + chunk, 청크 페이로드는 1바이트
    assert_eq!(s.relayed_messages, 4);
    assert_eq!(s.relayed_bytes, 1);
}

#[tokio::test]
async fn test_clean_disconnect_notifies_remaining_peer() {
    let addr = start_server().await;

    let (leaver, mut leaver_events) = DropClient::connect(addr, Config::default()).await.unwrap();
    let (stayer, mut stayer_events) = DropClient::connect(addr, Config::default()).await.unwrap();

    expect_pairing_found(&mut leaver_events).await;
    expect_pairing_found(&mut stayer_events).await;

    leaver.stop().await;

    loop {
        if let SessionEvent::PairingLost = next_event(&mut stayer_events).await {
            break;
        }
    }
    assert!(stayer.is_running());
}
