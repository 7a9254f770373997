//! 페어링 룸 관리
//!
//! - 네트워크 주소가 같은 연결을 같은 룸으로 결정적으로 그룹화
//! - 멤버 수가 2 이상이 되면 pairing-found, 2 미만으로 떨어지면 pairing-lost
//! - 빈 룸은 즉시 회수 (빈 룸에 메모리를 남기지 않음)

use std::net::{IpAddr, Ipv4Addr};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::Message;
use crate::ROOM_PREFIX;

/// 연결 식별자
pub type ConnId = u64;

/// 연결별 송신 큐 핸들
pub type OutboundTx = mpsc::Sender<Message>;

/// 룸 멤버 (연결 ID + 송신 큐)
struct RoomMember {
    conn_id: ConnId,
    tx: OutboundTx,
}

/// 룸 (같은 네트워크 주소를 공유하는 연결들)
#[derive(Default)]
struct Room {
    members: Vec<RoomMember>,
}

/// 페어링에 필요한 최소 멤버 수
pub const PAIRING_THRESHOLD: usize = 2;

/// IP 주소 정규화
///
/// IPv6 표기가 달라도 물리적으로 같은 호스트면 같은 룸으로 가야 함:
/// - IPv4-mapped IPv6 (::ffff:a.b.c.d) → a.b.c.d
/// - IPv6 루프백 (::1) → 127.0.0.1
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return IpAddr::V4(Ipv4Addr::LOCALHOST);
            }
            match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            }
        }
        v4 => v4,
    }
}

/// 연결의 네트워크 신원에서 룸 이름 유도
///
/// 신원을 얻을 수 없는 연결은 자기만의 퇴화 룸으로 격리 (절대 페어링 안 됨)
pub fn derive_room_name(ip: Option<IpAddr>, conn_id: ConnId) -> String {
    match ip {
        Some(ip) => format!("{}{}", ROOM_PREFIX, normalize_ip(ip)),
        None => format!("conn-{}", conn_id),
    }
}

/// 룸 레지스트리
///
/// 룸 멤버십은 여러 연결의 활동이 동시에 건드리는 유일한 공유 상태,
/// 모든 변경은 DashMap 엔트리 가드 아래에서 수행
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// 연결을 룸에 추가하고 추가 후 멤버 수 반환
    ///
    /// 멤버 수가 2 이상이면 룸의 모든 멤버에게 pairing-found 브로드캐스트
    /// (이미 페어링된 룸에 세 번째가 들어와도 재공지, 클라이언트엔 멱등)
    pub async fn join(&self, room_name: &str, conn_id: ConnId, tx: OutboundTx) -> usize {
        let (count, txs) = {
            let mut room = self.rooms.entry(room_name.to_string()).or_default();
            room.members.push(RoomMember { conn_id, tx });

            let count = room.members.len();
            let txs: Vec<OutboundTx> = if count >= PAIRING_THRESHOLD {
                room.members.iter().map(|m| m.tx.clone()).collect()
            } else {
                Vec::new()
            };
            (count, txs)
        };

        debug!(room = room_name, conn_id, count, "room joined");

        if !txs.is_empty() {
            info!(room = room_name, count, "pairing found");
            for tx in txs {
                let _ = tx.send(Message::PairingFound).await;
            }
        }

        count
    }

    /// 연결을 룸에서 제거
    ///
    /// 남은 멤버 수가 2 미만이면 남은 멤버에게 pairing-lost 브로드캐스트,
    /// 룸이 비면 레지스트리에서 제거
    pub async fn leave(&self, room_name: &str, conn_id: ConnId) {
        let remaining: Option<Vec<OutboundTx>> = {
            match self.rooms.get_mut(room_name) {
                Some(mut room) => {
                    room.members.retain(|m| m.conn_id != conn_id);
                    if room.members.len() < PAIRING_THRESHOLD {
                        Some(room.members.iter().map(|m| m.tx.clone()).collect())
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        self.rooms
            .remove_if(room_name, |_, room| room.members.is_empty());

        debug!(room = room_name, conn_id, "room left");

        if let Some(txs) = remaining {
            if !txs.is_empty() {
                info!(room = room_name, "pairing lost");
            }
            for tx in txs {
                let _ = tx.send(Message::PairingLost).await;
            }
        }
    }

    /// 룸에서 지정 연결을 제외한 멤버들의 송신 큐 반환 (릴레이용)
    pub fn peer_txs(&self, room_name: &str, exclude: ConnId) -> Vec<OutboundTx> {
        match self.rooms.get(room_name) {
            Some(room) => room
                .members
                .iter()
                .filter(|m| m.conn_id != exclude)
                .map(|m| m.tx.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// 룸의 현재 멤버 수
    pub fn member_count(&self, room_name: &str) -> usize {
        self.rooms
            .get(room_name)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    /// 활성 룸 수
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
