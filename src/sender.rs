//! 송신측 배치 펌프
//!
//! batch-announce → 파일별 (file-offer → 청크 스트림) 순서로 방출.
//! 청크마다 yield로 협조적 페이싱, 파일 사이에는 설정된 휴지.
//! 파일 내 방출 순서가 유일한 정확성 요건

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chunk::ChunkSplitter;
use crate::config::Config;
use crate::message::{BatchAnnounceMessage, FileChunkMessage, FileOfferMessage, Message};
use crate::stats::SessionStats;
use crate::{Error, Result};

/// 스테이징된 파일 (이름, 크기, MIME 타입, 바이트 소스)
///
/// 파일 선택 협력자가 공급, 세션이 소유
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// 파일 이름
    pub name: String,

    /// 크기 (바이트)
    pub size: u64,

    /// MIME 타입
    pub mime_type: String,

    /// 파일 내용
    pub data: Bytes,
}

impl StagedFile {
    /// 메모리 바이트로부터 생성
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime_type: mime_type.into(),
            data,
        }
    }

    /// 디스크 파일로부터 생성, MIME 타입은 확장자로 추정
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Unknown(format!("파일 이름 없음: {:?}", path)))?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self::from_bytes(name, mime_type, Bytes::from(data)))
    }

    /// 이 파일의 file-offer 메시지
    pub fn offer(&self) -> FileOfferMessage {
        FileOfferMessage::new(self.name.clone(), self.size, self.mime_type.clone())
    }
}

/// 배치 하나를 송신 큐로 방출
///
/// 송신 큐는 연결 writer 태스크가 순서 그대로 비우므로
/// 여기서의 방출 순서가 곧 전송로 순서.
/// 통계는 파일 방출이 끝난 시점에 파일 단위로 집계
pub async fn send_batch(
    files: &[StagedFile],
    out: &mpsc::Sender<Message>,
    config: &Config,
    stats: &RwLock<SessionStats>,
) -> Result<()> {
    let announce = Message::BatchAnnounce(BatchAnnounceMessage {
        count: files.len() as u32,
    });
    out.send(announce).await.map_err(|_| Error::ChannelError)?;

    for (idx, file) in files.iter().enumerate() {
        out.send(Message::FileOffer(file.offer()))
            .await
            .map_err(|_| Error::ChannelError)?;

        let mut sent_chunks = 0u64;
        for chunk in ChunkSplitter::new(file.data.clone(), config.chunk_size) {
            let msg = Message::FileChunk(FileChunkMessage {
                buffer: chunk.to_vec(),
            });
            out.send(msg).await.map_err(|_| Error::ChannelError)?;
            sent_chunks += 1;

            // 청크마다 양보해서 다른 태스크를 굶기지 않음
            tokio::task::yield_now().await;
        }

        debug!(name = %file.name, size = file.size, chunks = sent_chunks, "file sent");
        stats.write().record_file_sent(file.size);

        // 파일 사이 휴지 (마지막 파일 뒤는 제외)
        if idx + 1 < files.len() && config.inter_file_pause_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.inter_file_pause_ms)).await;
        }
    }

    info!(files = files.len(), "batch sent");
    Ok(())
}
