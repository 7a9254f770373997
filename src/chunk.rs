//! 청크 코덱
//!
//! - ChunkSplitter: 파일을 고정 크기 연속 범위로 분할 (마지막만 짧을 수 있음)
//! - FileAssembler: 도착 순서 그대로 누적, 바이트 수 계산으로 완료 판정
//!
//! 순서/결손 복구는 전송로(TCP)의 보장에 전적으로 의존함

use bytes::{Bytes, BytesMut};

use crate::message::FileOfferMessage;

/// 청크 분할기 (송신측)
///
/// 단일 전송 패스를 표현하는 소모성 이터레이터, 재시작 불가
pub struct ChunkSplitter {
    data: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl ChunkSplitter {
    /// 새 분할기 생성
    ///
    /// chunk_size는 1 이상이어야 함, 0이면 1로 보정
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }

    /// 남은 청크 수
    pub fn remaining_chunks(&self) -> usize {
        let remaining = self.data.len() - self.offset;
        (remaining + self.chunk_size - 1) / self.chunk_size
    }
}

impl Iterator for ChunkSplitter {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.data.len() {
            return None;
        }

        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }
}

/// 완성된 수신 파일 (바이트 + 메타데이터)
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    /// 파일 이름
    pub name: String,

    /// 선언된 크기 (바이트)
    pub size: u64,

    /// MIME 타입
    pub mime_type: String,

    /// 재조립된 데이터
    pub data: Bytes,
}

/// 파일 재조립기 (수신측)
///
/// file-offer 하나당 하나 생성, 새 오퍼가 오면 통째로 교체됨
#[derive(Debug)]
pub struct FileAssembler {
    /// 오퍼 메타데이터
    offer: FileOfferMessage,

    /// 도착 순서 그대로의 청크들
    chunks: Vec<Bytes>,

    /// 지금까지 수신한 바이트 수
    received_bytes: u64,
}

impl FileAssembler {
    /// 오퍼로부터 새 재조립 컨텍스트 생성
    pub fn new(offer: FileOfferMessage) -> Self {
        Self {
            offer,
            chunks: Vec::new(),
            received_bytes: 0,
        }
    }

    /// 청크 추가, 추가 후 완료 여부 반환
    pub fn push_chunk(&mut self, data: Bytes) -> bool {
        self.received_bytes += data.len() as u64;
        self.chunks.push(data);
        self.is_complete()
    }

    /// 완료 여부 (수신 바이트 >= 선언 크기)
    ///
    /// 크기 0 파일은 청크 없이 오퍼만으로 완료됨
    pub fn is_complete(&self) -> bool {
        self.received_bytes >= self.offer.size
    }

    /// 수신 바이트 수
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// 오퍼 메타데이터
    pub fn offer(&self) -> &FileOfferMessage {
        &self.offer
    }

    /// 청크들을 도착 순서대로 연결해 파일로 확정
    ///
    /// 선언 크기를 넘는 초과 바이트는 잘라냄
    pub fn into_file(self) -> ReceivedFile {
        let mut buf = BytesMut::with_capacity(self.received_bytes as usize);
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk);
        }
        buf.truncate(self.offer.size as usize);

        ReceivedFile {
            name: self.offer.name,
            size: self.offer.size,
            mime_type: self.offer.mime_type,
            data: buf.freeze(),
        }
    }
}
