//! # ZDP (Zero-click Drop Protocol)
//!
//! 같은 네트워크의 두 단말을 자동 페어링하고 파일을 청크 릴레이로 전송하는 프로토콜
//!
//! ## 핵심 특징
//! - **제로클릭 페어링**: 코드/QR 없이 공인 주소가 같으면 같은 룸으로 자동 매칭
//! - **룸 단위 릴레이**: 서버는 페이로드를 해석하지 않고 상대 멤버에게 그대로 전달
//! - **청크 스트림**: 파일을 고정 크기 청크로 분할, 도착 순서 그대로 재조립
//! - **배치 전송**: 한 세션에 여러 파일을 연속 전송, 배치 완료 1회 통지
//! - **TCP 순서 보장 의존**: 재전송/ACK/체크섬 없음, 바이트 수 계산만으로 완료 판정
//! - **협조적 페이싱**: 청크마다 yield로 다른 작업을 굶기지 않음

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod room;
pub mod sender;
pub mod server;
pub mod session;
pub mod stats;

pub use chunk::{ChunkSplitter, FileAssembler, ReceivedFile};
pub use client::DropClient;
pub use config::Config;
pub use error::{Error, Result};
pub use message::{BatchAnnounceMessage, FileChunkMessage, FileOfferMessage, Message, MessageType};
pub use relay::Relay;
pub use room::{ConnId, RoomRegistry};
pub use sender::StagedFile;
pub use server::RelayServer;
pub use session::{SessionEvent, SessionPhase, TransferSession};
pub use stats::{RelayStats, SessionStats};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024; // 16KB

/// 룸 이름 접두사
pub const ROOM_PREFIX: &str = "network-";

/// 매직 넘버 (프레임 식별용)
pub const MAGIC_NUMBER: u32 = 0x5A445250; // "ZDRP"
