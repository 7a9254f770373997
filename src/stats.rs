//! 릴레이/세션 통계

use std::time::{Duration, Instant};

/// 릴레이 서버 통계
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// 서버 시작 시간
    pub start_time: Instant,

    /// 누적 연결 수
    pub total_connections: u64,

    /// 현재 활성 연결 수
    pub active_connections: u64,

    /// 현재 활성 룸 수
    pub active_rooms: u64,

    /// 성립된 페어링 수
    pub pairings_formed: u64,

    /// 해제된 페어링 수
    pub pairings_lost: u64,

    /// 릴레이된 메시지 수
    pub relayed_messages: u64,

    /// 릴레이된 청크 페이로드 바이트
    pub relayed_bytes: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_connections: 0,
            active_connections: 0,
            active_rooms: 0,
            pairings_formed: 0,
            pairings_lost: 0,
            relayed_messages: 0,
            relayed_bytes: 0,
        }
    }

    pub fn record_connection(&mut self) {
        self.total_connections += 1;
        self.active_connections += 1;
    }

    pub fn record_disconnect(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }

    pub fn record_pairing(&mut self) {
        self.pairings_formed += 1;
    }

    pub fn record_pairing_lost(&mut self) {
        self.pairings_lost += 1;
    }

    pub fn record_relayed(&mut self, payload_bytes: u64) {
        self.relayed_messages += 1;
        self.relayed_bytes += payload_bytes;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Uptime: {:.0}s | Conns: {} active / {} total | Rooms: {} | Pairings: +{} -{} | Relayed: {} msgs, {} bytes",
            self.elapsed().as_secs_f64(),
            self.active_connections,
            self.total_connections,
            self.active_rooms,
            self.pairings_formed,
            self.pairings_lost,
            self.relayed_messages,
            self.relayed_bytes,
        )
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 클라이언트 세션 통계
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// 세션 시작 시간
    pub start_time: Instant,

    /// 송신한 파일 수
    pub files_sent: u64,

    /// 송신한 바이트
    pub bytes_sent: u64,

    /// 수신 완료한 파일 수
    pub files_received: u64,

    /// 수신한 바이트
    pub bytes_received: u64,

    /// 완료된 배치 수
    pub batches_completed: u64,

    /// 세션 리셋 횟수
    pub resets: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_sent: 0,
            bytes_sent: 0,
            files_received: 0,
            bytes_received: 0,
            batches_completed: 0,
            resets: 0,
        }
    }

    pub fn record_file_sent(&mut self, bytes: u64) {
        self.files_sent += 1;
        self.bytes_sent += bytes;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 수신 처리율 (bytes/sec)
    pub fn receive_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.1}s | Sent: {} files / {} bytes | Received: {} files / {} bytes | Batches: {} | Resets: {}",
            self.elapsed().as_secs_f64(),
            self.files_sent,
            self.bytes_sent,
            self.files_received,
            self.bytes_received,
            self.batches_completed,
            self.resets,
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
