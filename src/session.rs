//! 전송 세션 상태 기계
//!
//! 연결당 하나, 송신측과 수신측 진행 상태를 모두 추적:
//! - 송신측: 스테이징된 파일 목록 (idle → staged → sending → complete)
//! - 수신측: 배치 기대치, 현재 재조립 컨텍스트, 완료 파일 목록
//!
//! 프로토콜 상태와 표시 계층은 분리: 상태 기계는 타입드 이벤트만 발행하고
//! 표시 계층은 순수 구독자로 프로토콜 필드를 직접 읽거나 바꾸지 않음

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chunk::{FileAssembler, ReceivedFile};
use crate::message::{BatchAnnounceMessage, FileOfferMessage};
use crate::sender::StagedFile;
use crate::{Error, Result};

/// 세션 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// 기준 상태 (페어링 여부와 무관)
    Idle,

    /// 보낼 파일을 골랐지만 아직 전송 전
    Staged,

    /// 배치 송신 중
    Sending,

    /// 배치 수신 중 (첫 file-offer 수신 시점부터)
    Receiving,

    /// 배치 완료
    Complete,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Staged => "staged",
            SessionPhase::Sending => "sending",
            SessionPhase::Receiving => "receiving",
            SessionPhase::Complete => "complete",
        }
    }
}

/// 세션 이벤트 (표시 계층 구독용)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 룸에 상대가 생김
    PairingFound,

    /// 상대를 잃음, 진행 중이던 전송은 폐기됨
    PairingLost,

    /// 세션 단계 전이
    PhaseChanged(SessionPhase),

    /// 파일 하나 재조립 완료 (배치 내 {index}/{total})
    FileCompleted {
        index: u32,
        total: u32,
        file: ReceivedFile,
    },

    /// 배치 전체 완료, 오퍼 순서 그대로의 완료 파일 목록
    BatchComplete(Vec<ReceivedFile>),
}

/// 이벤트 수신 채널 타입
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// 전송 세션 상태 기계
pub struct TransferSession {
    phase: SessionPhase,

    /// 송신측: 스테이징된 파일들
    staged: Vec<StagedFile>,

    /// 수신측: 배치에서 기대하는 파일 수
    expected_files: u32,

    /// 수신측: 완료된 파일들 (오퍼 순서)
    completed: Vec<ReceivedFile>,

    /// 수신측: 현재 파일의 재조립 컨텍스트
    assembler: Option<FileAssembler>,

    /// 오퍼 검증용 최대 파일 크기
    max_file_size: u64,

    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransferSession {
    /// 새 세션과 이벤트 구독 채널 생성
    pub fn new(max_file_size: u64) -> (Self, SessionEventReceiver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            phase: SessionPhase::Idle,
            staged: Vec::new(),
            expected_files: 0,
            completed: Vec::new(),
            assembler: None,
            max_file_size,
            event_tx,
        };
        (session, event_rx)
    }

    /// 현재 단계
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// 완료된 파일 목록
    pub fn completed_files(&self) -> &[ReceivedFile] {
        &self.completed
    }

    /// 배치에서 기대하는 파일 수
    pub fn expected_files(&self) -> u32 {
        self.expected_files
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = self.phase.as_str(), to = phase.as_str(), "phase");
            self.phase = phase;
            let _ = self.event_tx.send(SessionEvent::PhaseChanged(phase));
        }
    }

    /// 페어링 성립 통지
    pub fn on_pairing_found(&mut self) {
        let _ = self.event_tx.send(SessionEvent::PairingFound);
    }

    /// 페어링 해제 통지
    ///
    /// 진행 중이던 전송은 무조건 폐기, idle로 복귀 (부분 파일은 노출 안 함)
    pub fn on_pairing_lost(&mut self) {
        self.clear();
        self.set_phase(SessionPhase::Idle);
        let _ = self.event_tx.send(SessionEvent::PairingLost);
    }

    /// 로컬 파일 선택 (idle → staged), 네트워크 효과 없음
    pub fn stage_files(&mut self, files: Vec<StagedFile>) -> Result<()> {
        if self.phase != SessionPhase::Idle {
            return Err(Error::InvalidPhase {
                phase: self.phase.as_str(),
                operation: "stage_files",
            });
        }
        if files.is_empty() {
            return Err(Error::Unknown("스테이징할 파일 없음".into()));
        }

        self.staged = files;
        self.set_phase(SessionPhase::Staged);
        Ok(())
    }

    /// 송신 시작 (staged → sending), 송신 펌프가 소비할 파일들 반환
    pub fn begin_sending(&mut self) -> Result<Vec<StagedFile>> {
        if self.phase != SessionPhase::Staged {
            return Err(Error::InvalidPhase {
                phase: self.phase.as_str(),
                operation: "begin_sending",
            });
        }

        self.set_phase(SessionPhase::Sending);
        Ok(std::mem::take(&mut self.staged))
    }

    /// 송신 펌프가 마지막 파일까지 보낸 뒤 호출 (sending → complete)
    pub fn on_send_complete(&mut self) {
        if self.phase == SessionPhase::Sending {
            self.set_phase(SessionPhase::Complete);
        }
    }

    /// batch-announce 수신: 기대 파일 수 기록, 완료 목록 리셋
    ///
    /// 단계는 아직 바꾸지 않음, 첫 file-offer에서 receiving이 됨
    pub fn on_batch_announce(&mut self, msg: &BatchAnnounceMessage) {
        debug!(count = msg.count, "batch announced");
        self.expected_files = msg.count;
        self.completed.clear();
        self.assembler = None;
    }

    /// file-offer 수신: 새 파일의 재조립 컨텍스트 시작
    ///
    /// 이전의 미완료 컨텍스트는 암묵적으로 폐기됨.
    /// 잘못된 오퍼(빈 이름, 과대 크기)는 보류 컨텍스트를 버리고 무시
    pub fn on_file_offer(&mut self, offer: FileOfferMessage) -> Result<()> {
        if let Err(e) = offer.validate(self.max_file_size) {
            warn!(name = %offer.name, size = offer.size, "malformed offer discarded");
            self.assembler = None;
            return Err(e);
        }

        if self.assembler.take().is_some() {
            debug!("incomplete file abandoned by new offer");
        }

        debug!(name = %offer.name, size = offer.size, mime = %offer.mime_type, "file offer");
        self.assembler = Some(FileAssembler::new(offer));
        self.set_phase(SessionPhase::Receiving);

        // 크기 0 파일은 청크 없이 오퍼만으로 완료 (0 >= 0)
        if self.assembler.as_ref().is_some_and(FileAssembler::is_complete) {
            self.finalize_current_file();
        }
        Ok(())
    }

    /// file-chunk 수신: 현재 컨텍스트에 누적, 완료되면 파일 확정
    ///
    /// 오퍼 없이 도착한 청크는 버림 (폐기된 전송의 잔여분)
    pub fn on_chunk(&mut self, buffer: Bytes) {
        let Some(assembler) = self.assembler.as_mut() else {
            debug!(len = buffer.len(), "chunk without offer dropped");
            return;
        };

        if assembler.push_chunk(buffer) {
            self.finalize_current_file();
        }
    }

    /// session-reset: 모든 전송 상태를 버리고 기준 상태로 복귀
    pub fn on_session_reset(&mut self) {
        self.clear();
        self.set_phase(SessionPhase::Idle);
    }

    fn finalize_current_file(&mut self) {
        let Some(assembler) = self.assembler.take() else {
            return;
        };

        let file = assembler.into_file();
        info!(
            name = %file.name,
            size = file.size,
            received = self.completed.len() + 1,
            expected = self.expected_files,
            "file complete"
        );

        self.completed.push(file.clone());
        let _ = self.event_tx.send(SessionEvent::FileCompleted {
            index: self.completed.len() as u32,
            total: self.expected_files,
            file,
        });

        if self.completed.len() as u32 >= self.expected_files
            && self.phase != SessionPhase::Complete
        {
            self.set_phase(SessionPhase::Complete);
            let _ = self
                .event_tx
                .send(SessionEvent::BatchComplete(self.completed.clone()));
        }
    }

    fn clear(&mut self) {
        self.staged.clear();
        self.expected_files = 0;
        self.completed.clear();
        self.assembler = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 1024 * 1024;

    fn offer(name: &str, size: u64) -> FileOfferMessage {
        FileOfferMessage::new(name, size, "application/octet-stream")
    }

    fn drain(rx: &mut SessionEventReceiver) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_batch_with_zero_size_file() {
        let (mut session, mut rx) = TransferSession::new(MAX);

        // A: 10바이트 1청크, B: 0바이트 (청크 없이 완료)
        session.on_batch_announce(&BatchAnnounceMessage { count: 2 });
        session.on_file_offer(offer("a.bin", 10)).unwrap();
        assert_eq!(session.phase(), SessionPhase::Receiving);
        session.on_chunk(Bytes::from(vec![9u8; 10]));
        session.on_file_offer(offer("b.bin", 0)).unwrap();

        assert_eq!(session.phase(), SessionPhase::Complete);
        let completed = session.completed_files();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].name, "a.bin");
        assert_eq!(completed[0].data.len(), 10);
        assert_eq!(completed[1].name, "b.bin");
        assert_eq!(completed[1].data.len(), 0);

        // batch-complete는 정확히 1회
        let batch_events = drain(&mut rx)
            .into_iter()
            .filter(|ev| matches!(ev, SessionEvent::BatchComplete(_)))
            .count();
        assert_eq!(batch_events, 1);
    }

    #[test]
    fn test_new_offer_abandons_incomplete_file() {
        let (mut session, _rx) = TransferSession::new(MAX);

        session.on_batch_announce(&BatchAnnounceMessage { count: 1 });
        session.on_file_offer(offer("partial.bin", 100)).unwrap();
        session.on_chunk(Bytes::from(vec![0u8; 40]));

        // 미완료 상태에서 새 오퍼 → 이전 파일은 완료 목록에 없어야 함
        session.on_file_offer(offer("fresh.bin", 5)).unwrap();
        session.on_chunk(Bytes::from(vec![1u8; 5]));

        assert_eq!(session.completed_files().len(), 1);
        assert_eq!(session.completed_files()[0].name, "fresh.bin");
        assert_eq!(session.phase(), SessionPhase::Complete);
    }

    #[test]
    fn test_malformed_offer_discards_context() {
        let (mut session, _rx) = TransferSession::new(MAX);

        session.on_batch_announce(&BatchAnnounceMessage { count: 1 });
        session.on_file_offer(offer("good.bin", 10)).unwrap();
        session.on_chunk(Bytes::from(vec![0u8; 5]));

        assert!(session.on_file_offer(offer("", 10)).is_err());

        // 보류 컨텍스트가 버려졌으므로 이후 청크는 무시됨
        session.on_chunk(Bytes::from(vec![0u8; 100]));
        assert!(session.completed_files().is_empty());
    }

    #[test]
    fn test_chunk_without_offer_is_dropped() {
        let (mut session, _rx) = TransferSession::new(MAX);
        session.on_chunk(Bytes::from(vec![0u8; 100]));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.completed_files().is_empty());
    }

    #[test]
    fn test_pairing_lost_abandons_transfer() {
        let (mut session, mut rx) = TransferSession::new(MAX);

        session.on_batch_announce(&BatchAnnounceMessage { count: 2 });
        session.on_file_offer(offer("a.bin", 100)).unwrap();
        session.on_chunk(Bytes::from(vec![0u8; 50]));

        session.on_pairing_lost();

        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.completed_files().is_empty());
        assert_eq!(session.expected_files(), 0);
        assert!(drain(&mut rx)
            .iter()
            .any(|ev| matches!(ev, SessionEvent::PairingLost)));
    }

    #[test]
    fn test_session_reset_returns_to_idle() {
        let (mut session, _rx) = TransferSession::new(MAX);

        session.on_batch_announce(&BatchAnnounceMessage { count: 1 });
        session.on_file_offer(offer("a.bin", 1)).unwrap();
        session.on_chunk(Bytes::from(vec![0u8; 1]));
        assert_eq!(session.phase(), SessionPhase::Complete);

        session.on_session_reset();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.completed_files().is_empty());
    }

    #[test]
    fn test_sender_side_transitions() {
        let (mut session, _rx) = TransferSession::new(MAX);

        let files = vec![StagedFile::from_bytes(
            "a.txt",
            "text/plain",
            Bytes::from_static(b"hello"),
        )];

        // staged 전에는 송신 불가
        assert!(session.begin_sending().is_err());

        session.stage_files(files).unwrap();
        assert_eq!(session.phase(), SessionPhase::Staged);

        // staged 중 재스테이징 불가
        assert!(session
            .stage_files(vec![StagedFile::from_bytes(
                "b.txt",
                "text/plain",
                Bytes::new()
            )])
            .is_err());

        let taken = session.begin_sending().unwrap();
        assert_eq!(taken.len(), 1);
        assert_eq!(session.phase(), SessionPhase::Sending);

        session.on_send_complete();
        assert_eq!(session.phase(), SessionPhase::Complete);
    }
}
