//! 시그널링 릴레이
//!
//! 룸 멤버가 보낸 메시지를 같은 룸의 다른 멤버들에게 그대로 전달.
//! 페이로드 검사 없음: file-chunk의 크기/오프셋/수는 보지 않음.
//! 송신자별 순서는 연결 태스크가 순차 처리하므로 그대로 보존됨

use std::sync::Arc;

use crate::message::Message;
use crate::room::{ConnId, RoomRegistry};

/// 시그널링 릴레이
pub struct Relay {
    registry: Arc<RoomRegistry>,
}

impl Relay {
    /// 새 릴레이 생성
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// 메시지를 송신자를 제외한 룸 멤버들에게 전달
    ///
    /// 서버 발신 전용 타입(pairing-found/lost)은 무시,
    /// 전달된 멤버 수 반환 (0이면 상대 없음)
    pub async fn relay(&self, room_name: &str, sender: ConnId, msg: Message) -> usize {
        if msg.is_server_origin() {
            return 0;
        }

        let peers = self.registry.peer_txs(room_name, sender);
        let delivered = peers.len();
        for tx in peers {
            let _ = tx.send(msg.clone()).await;
        }
        delivered
    }
}
