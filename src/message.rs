//! 프로토콜 메시지 정의와 프레이밍
//!
//! 전송로는 TCP이므로 프레임은 u32 길이 프리픽스 + (헤더 + 페이로드) 구조.
//! 릴레이 서버는 file-chunk 페이로드를 해석하지 않고 그대로 전달함

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// 페어링 성립 (서버 → 클라이언트, 룸 멤버 2 이상)
    PairingFound = 1,

    /// 페어링 해제 (서버 → 클라이언트, 룸 멤버 2 미만)
    PairingLost = 2,

    /// 세션 리셋 (양쪽 모두 기준 상태로 복귀)
    SessionReset = 3,

    /// 배치 공지 (이후 전송될 파일 수 선언)
    BatchAnnounce = 4,

    /// 파일 오퍼 (다음 청크 스트림의 메타데이터)
    FileOffer = 5,

    /// 파일 청크 (현재 파일의 다음 바이트 범위)
    FileChunk = 6,
}

/// 메시지 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입
    pub msg_type: MessageType,

    /// 페이로드 길이 (헤더 제외)
    pub payload_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type,
            payload_len,
        }
    }

    /// 매직 넘버와 버전 검증
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: self.magic,
            });
        }
        if self.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        Ok(())
    }
}

/// 배치 공지 메시지
///
/// 한 배치에서 전송될 file-offer 수를 선언, 배치당 1회 선행 전송
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnnounceMessage {
    /// 이후 전송될 파일 수
    pub count: u32,
}

/// 파일 오퍼 메시지
///
/// 새 오퍼는 이전의 미완료 재조립 컨텍스트를 암묵적으로 폐기함
/// (별도 abort 메시지 없음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOfferMessage {
    /// 파일 이름
    pub name: String,

    /// 선언된 크기 (바이트)
    pub size: u64,

    /// MIME 타입
    pub mime_type: String,
}

impl FileOfferMessage {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// 오퍼 검증, 실패 시 수신측은 보류 중인 재조립 컨텍스트를 폐기
    pub fn validate(&self, max_file_size: u64) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::MalformedOffer {
                reason: "빈 파일 이름".into(),
            });
        }
        if self.size > max_file_size {
            return Err(Error::MalformedOffer {
                reason: format!("선언 크기 {} > 최대 {}", self.size, max_file_size),
            });
        }
        Ok(())
    }
}

/// 파일 청크 메시지
///
/// 순서 메타데이터 없음, 전송로의 순서 보장에 전적으로 의존
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkMessage {
    /// 원시 바이트 범위 (릴레이는 내용을 보지 않음)
    pub buffer: Vec<u8>,
}

/// 통합 메시지 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PairingFound,
    PairingLost,
    SessionReset,
    BatchAnnounce(BatchAnnounceMessage),
    FileOffer(FileOfferMessage),
    FileChunk(FileChunkMessage),
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::PairingFound => MessageType::PairingFound,
            Message::PairingLost => MessageType::PairingLost,
            Message::SessionReset => MessageType::SessionReset,
            Message::BatchAnnounce(_) => MessageType::BatchAnnounce,
            Message::FileOffer(_) => MessageType::FileOffer,
            Message::FileChunk(_) => MessageType::FileChunk,
        }
    }

    /// 서버 발신 전용 메시지 여부 (클라이언트가 보내면 릴레이에서 무시)
    pub fn is_server_origin(&self) -> bool {
        matches!(self, Message::PairingFound | Message::PairingLost)
    }

    /// 메시지를 프레임 바이트로 직렬화 (길이 프리픽스 제외)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Message::PairingFound | Message::PairingLost | Message::SessionReset => Vec::new(),
            Message::BatchAnnounce(m) => bincode::serialize(m)?,
            Message::FileOffer(m) => bincode::serialize(m)?,
            Message::FileChunk(m) => bincode::serialize(m)?,
        };

        let header = MessageHeader::new(self.msg_type(), payload.len() as u32);
        let header_bytes = bincode::serialize(&header)?;

        let mut buf = Vec::with_capacity(header_bytes.len() + payload.len());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// 프레임 바이트에서 메시지 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        let header: MessageHeader = bincode::deserialize(bytes)?;
        header.validate()?;

        // bincode는 가변 길이이므로 헤더를 재직렬화해서 실제 크기 확인
        let header_bytes = bincode::serialize(&header)?;
        let payload = &bytes[header_bytes.len().min(bytes.len())..];

        let msg = match header.msg_type {
            MessageType::PairingFound => Message::PairingFound,
            MessageType::PairingLost => Message::PairingLost,
            MessageType::SessionReset => Message::SessionReset,
            MessageType::BatchAnnounce => Message::BatchAnnounce(bincode::deserialize(payload)?),
            MessageType::FileOffer => Message::FileOffer(bincode::deserialize(payload)?),
            MessageType::FileChunk => Message::FileChunk(bincode::deserialize(payload)?),
        };
        Ok(msg)
    }
}

/// 프레임 한 개 송신 (u32 LE 길이 프리픽스 + 프레임)
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let frame = msg.encode()?;
    writer.write_u32_le(frame.len() as u32).await?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// 프레임 한 개 수신
///
/// max_frame_len 초과 프레임은 FrameTooLarge, EOF는 ConnectionClosed
pub async fn read_message<R>(reader: &mut R, max_frame_len: usize) -> Result<Message>
where
    R: AsyncReadExt + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    };

    if len > max_frame_len {
        return Err(Error::FrameTooLarge {
            len,
            max_len: max_frame_len,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Message::decode(&buf)
}
