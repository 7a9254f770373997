//! 프로토콜 설정

use crate::DEFAULT_CHUNK_SIZE;

/// ZDP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 파일 사이 전송 휴지 (밀리초)
    /// 정확성 요건이 아닌 페이싱용, 0이면 휴지 없음
    pub inter_file_pause_ms: u64,

    /// 최대 프레임 길이 (바이트)
    /// 청크 + 헤더 오버헤드보다 커야 함
    pub max_frame_len: usize,

    /// 파일 오퍼에서 허용하는 최대 선언 크기 (바이트)
    /// 초과는 MalformedOffer로 폐기
    pub max_file_size: u64,

    /// 연결당 송신 큐 용량 (메시지 수)
    pub outbound_queue_size: usize,

    /// 수신 커맨드 큐 용량 (메시지 수)
    pub inbound_queue_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_file_pause_ms: 10,
            max_frame_len: 1024 * 1024,          // 1MB
            max_file_size: 16 * 1024 * 1024 * 1024, // 16GB
            outbound_queue_size: 1024,
            inbound_queue_size: 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일 크기에 대한 청크 수 계산
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        if file_size == 0 {
            return 0;
        }
        (file_size + self.chunk_size as u64 - 1) / self.chunk_size as u64
    }

    /// 대용량 파일용 설정
    pub fn bulk() -> Self {
        Self {
            chunk_size: 64 * 1024,               // 64KB
            inter_file_pause_ms: 0,              // 휴지 없음
            max_frame_len: 2 * 1024 * 1024,      // 2MB
            outbound_queue_size: 4096,
            inbound_queue_size: 4096,
            ..Self::default()
        }
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            chunk_size: 4 * 1024,                // 4KB
            inter_file_pause_ms: 50,
            max_frame_len: 256 * 1024,           // 256KB
            max_file_size: 1024 * 1024 * 1024,   // 1GB
            outbound_queue_size: 256,
            inbound_queue_size: 256,
        }
    }
}
