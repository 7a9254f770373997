//! 릴레이 서버
//!
//! - 연결 수락 시 피어 주소로 룸 자동 배정 (명시적 페어링 단계 없음)
//! - 수신 프레임은 해석 없이 같은 룸의 다른 멤버에게 릴레이
//! - 연결 종료 시 룸 이탈, 남은 멤버에게 pairing-lost
//!
//! 연결마다 reader 루프 + writer 태스크, 연결 내 처리 순서는 수신 순서 그대로

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::message::{read_message, write_message, Message, MessageType};
use crate::relay::Relay;
use crate::room::{derive_room_name, ConnId, RoomRegistry};
use crate::stats::RelayStats;
use crate::{Config, Error, Result};

/// 릴레이 서버
pub struct RelayServer {
    config: Config,
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    relay: Arc<Relay>,
    stats: Arc<RwLock<RelayStats>>,
    next_conn_id: Arc<AtomicU64>,
}

impl RelayServer {
    /// 주소에 바인드해서 서버 생성
    pub async fn bind(addr: SocketAddr, config: Config) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let registry = Arc::new(RoomRegistry::new());
        let relay = Arc::new(Relay::new(registry.clone()));

        Ok(Self {
            config,
            listener,
            registry,
            relay,
            stats: Arc::new(RwLock::new(RelayStats::new())),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// 실제 바인드된 주소 (포트 0으로 바인드했을 때 확인용)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 룸 레지스트리 핸들
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.registry.clone()
    }

    /// 현재 통계 스냅샷
    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }

    /// 통계 핸들 (run으로 소유권을 넘기기 전에 확보)
    pub fn stats_handle(&self) -> Arc<RwLock<RelayStats>> {
        self.stats.clone()
    }

    /// 수락 루프 실행
    pub async fn run(self) -> Result<()> {
        info!("ZDP relay server listening on {}", self.local_addr()?);

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);

            let config = self.config.clone();
            let registry = self.registry.clone();
            let relay = self.relay.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(config, registry, relay, stats, conn_id, stream, peer_addr)
                        .await
                {
                    warn!(conn_id, "connection error: {}", e);
                }
            });
        }
    }
}

/// 연결 하나 처리: 룸 입장 → 릴레이 루프 → 룸 이탈
async fn handle_connection(
    config: Config,
    registry: Arc<RoomRegistry>,
    relay: Arc<Relay>,
    stats: Arc<RwLock<RelayStats>>,
    conn_id: ConnId,
    stream: TcpStream,
    peer_addr: SocketAddr,
) -> Result<()> {
    let room_name = derive_room_name(Some(peer_addr.ip()), conn_id);
    info!(conn_id, ip = %peer_addr.ip(), room = %room_name, "connection");

    let (mut read_half, write_half) = stream.into_split();

    // writer 태스크: 송신 큐를 순서 그대로 비움
    let (out_tx, out_rx) = mpsc::channel::<Message>(config.outbound_queue_size);
    let writer_task = tokio::spawn(drain_outbound(write_half, out_rx));

    let member_count = registry.join(&room_name, conn_id, out_tx).await;
    {
        let mut s = stats.write();
        s.record_connection();
        if member_count == 2 {
            s.record_pairing();
        }
        s.active_rooms = registry.room_count() as u64;
    }

    // 릴레이 루프
    let result = loop {
        match read_message(&mut read_half, config.max_frame_len).await {
            Ok(msg) => {
                if msg.is_server_origin() {
                    debug!(conn_id, ?msg, "server-origin type from client ignored");
                    continue;
                }

                let payload_len = match &msg {
                    Message::FileChunk(c) => c.buffer.len() as u64,
                    _ => 0,
                };
                let msg_type = msg.msg_type();

                let delivered = relay.relay(&room_name, conn_id, msg).await;
                if delivered > 0 {
                    stats.write().record_relayed(payload_len);
                } else if msg_type != MessageType::FileChunk {
                    debug!(conn_id, ?msg_type, "no peer in room, dropped");
                }
            }
            Err(Error::ConnectionClosed) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let was_paired = registry.member_count(&room_name) >= 2;
    registry.leave(&room_name, conn_id).await;
    {
        let mut s = stats.write();
        s.record_disconnect();
        if was_paired {
            s.record_pairing_lost();
        }
        s.active_rooms = registry.room_count() as u64;
    }
    info!(conn_id, room = %room_name, "disconnected");

    writer_task.abort();
    result
}

/// 송신 큐를 소켓으로 비우는 태스크
async fn drain_outbound(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_message(&mut write_half, &msg).await {
            debug!("writer stopped: {}", e);
            break;
        }
    }
}
