//! 에러 타입 정의

use thiserror::Error;

/// ZDP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("프레임 크기 초과: {len} bytes (최대 {max_len})")]
    FrameTooLarge { len: usize, max_len: usize },

    #[error("유효하지 않은 파일 오퍼: {reason}")]
    MalformedOffer { reason: String },

    #[error("페어링 안 됨: 룸에 상대가 없음")]
    NotPaired,

    #[error("잘못된 세션 상태: {phase}에서 {operation} 불가")]
    InvalidPhase {
        phase: &'static str,
        operation: &'static str,
    },

    #[error("채널 에러")]
    ChannelError,

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("알 수 없는 에러: {0}")]
    Unknown(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
