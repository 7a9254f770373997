//! 클라이언트 연결 액터
//!
//! TCP 연결 하나를 소유하고 세 태스크로 나눔:
//! - reader: 프레임 해독 → 커맨드 큐
//! - writer: 송신 큐 → 소켓 (방출 순서 = 전송 순서)
//! - main: 커맨드를 순차 적용 (연결 내 수신 순서 보장)
//!
//! 세션 상태는 main 태스크만 만지므로 락 불필요

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::message::{read_message, write_message, Message};
use crate::sender::{send_batch, StagedFile};
use crate::session::{SessionEventReceiver, SessionPhase, TransferSession};
use crate::stats::SessionStats;
use crate::{Config, Error, Result};

/// 액터 커맨드
enum ClientCmd {
    /// 서버에서 수신한 메시지
    Inbound(Message),

    /// 파일 스테이징 (로컬 동작, 네트워크 효과 없음)
    Stage(Vec<StagedFile>),

    /// 스테이징된 배치 송신 시작
    Send,

    /// 송신 펌프 완료 통지
    SendDone,

    /// 세션 리셋 요청 (상대에게도 릴레이됨)
    Reset,

    /// 연결 끊김
    Disconnected,

    /// 정지
    Stop,
}

/// 액터 내부 상태 (main 태스크에서만 접근)
struct ClientInner {
    config: Config,
    session: TransferSession,
    out_tx: mpsc::Sender<Message>,
    cmd_tx: mpsc::Sender<ClientCmd>,
    stats: Arc<RwLock<SessionStats>>,

    /// 진행 중인 송신 펌프, reset/pairing-lost/disconnect 시 중단 대상
    pump: Option<JoinHandle<()>>,
}

impl ClientInner {
    async fn handle_inbound(&mut self, msg: Message) {
        match msg {
            Message::PairingFound => {
                info!("pairing found");
                self.session.on_pairing_found();
            }
            Message::PairingLost => {
                info!("pairing lost, transfer abandoned");
                self.abort_pump();
                self.session.on_pairing_lost();
            }
            Message::SessionReset => {
                debug!("session reset from peer");
                self.abort_pump();
                self.session.on_session_reset();
                self.stats.write().resets += 1;
            }
            Message::BatchAnnounce(m) => self.session.on_batch_announce(&m),
            Message::FileOffer(offer) => {
                let before = self.session.completed_files().len() as u64;
                if let Err(e) = self.session.on_file_offer(offer) {
                    warn!("offer rejected: {}", e);
                }
                // 크기 0 파일은 오퍼만으로 완료될 수 있음
                self.note_receive_progress(before, 0);
            }
            Message::FileChunk(chunk) => {
                let len = chunk.buffer.len() as u64;
                let before = self.session.completed_files().len() as u64;
                self.session.on_chunk(Bytes::from(chunk.buffer));
                self.note_receive_progress(before, len);
            }
        }
    }

    fn note_receive_progress(&mut self, files_before: u64, bytes: u64) {
        let files_after = self.session.completed_files().len() as u64;
        let mut stats = self.stats.write();
        stats.bytes_received += bytes;
        stats.files_received += files_after.saturating_sub(files_before);
        if files_after > files_before && self.session.phase() == SessionPhase::Complete {
            stats.batches_completed += 1;
        }
    }

    fn handle_stage(&mut self, files: Vec<StagedFile>) {
        if let Err(e) = self.session.stage_files(files) {
            warn!("stage rejected: {}", e);
        }
    }

    /// 배치 송신을 별도 태스크로 시작 (송신 중에도 reset/pairing-lost 처리 가능)
    fn handle_send(&mut self) {
        let files = match self.session.begin_sending() {
            Ok(files) => files,
            Err(e) => {
                warn!("send rejected: {}", e);
                return;
            }
        };

        let out_tx = self.out_tx.clone();
        let cmd_tx = self.cmd_tx.clone();
        let config = self.config.clone();
        let stats = self.stats.clone();
        self.pump = Some(tokio::spawn(async move {
            if let Err(e) = send_batch(&files, &out_tx, &config, &stats).await {
                warn!("batch send failed: {}", e);
            }
            let _ = cmd_tx.send(ClientCmd::SendDone).await;
        }));
    }

    fn handle_send_done(&mut self) {
        self.pump = None;
        self.session.on_send_complete();
    }

    /// 진행 중인 송신 펌프 중단, 잔여 오퍼/청크 방출 금지
    fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            debug!("batch pump aborted");
        }
    }

    async fn handle_reset(&mut self) {
        self.abort_pump();
        self.session.on_session_reset();
        self.stats.write().resets += 1;
        if self.out_tx.send(Message::SessionReset).await.is_err() {
            warn!("reset not delivered, connection gone");
        }
    }
}

/// 클라이언트 핸들 (외부에서 제어용)
pub struct DropClient {
    cmd_tx: mpsc::Sender<ClientCmd>,
    stats: Arc<RwLock<SessionStats>>,
    running: Arc<AtomicBool>,
}

impl DropClient {
    /// 서버에 연결하고 액터 시작, 핸들과 이벤트 구독 채널 반환
    pub async fn connect(
        server_addr: SocketAddr,
        config: Config,
    ) -> Result<(Self, SessionEventReceiver)> {
        let stream = TcpStream::connect(server_addr).await?;
        let (read_half, write_half) = stream.into_split();

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCmd>(config.inbound_queue_size);
        let (out_tx, out_rx) = mpsc::channel::<Message>(config.outbound_queue_size);

        let (session, event_rx) = TransferSession::new(config.max_file_size);
        let stats = Arc::new(RwLock::new(SessionStats::new()));
        let running = Arc::new(AtomicBool::new(true));

        info!("connected to relay {}", server_addr);

        // writer 태스크
        tokio::spawn(drain_outbound(write_half, out_rx));

        // reader 태스크
        let cmd_tx_reader = cmd_tx.clone();
        let running_reader = running.clone();
        let max_frame_len = config.max_frame_len;
        tokio::spawn(async move {
            read_loop(read_half, cmd_tx_reader, running_reader, max_frame_len).await;
        });

        // main 태스크
        let mut inner = ClientInner {
            config,
            session,
            out_tx,
            cmd_tx: cmd_tx.clone(),
            stats: stats.clone(),
            pump: None,
        };
        let running_main = running.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    ClientCmd::Inbound(msg) => inner.handle_inbound(msg).await,
                    ClientCmd::Stage(files) => inner.handle_stage(files),
                    ClientCmd::Send => inner.handle_send(),
                    ClientCmd::SendDone => inner.handle_send_done(),
                    ClientCmd::Reset => inner.handle_reset().await,
                    ClientCmd::Disconnected => {
                        inner.abort_pump();
                        inner.session.on_pairing_lost();
                        break;
                    }
                    ClientCmd::Stop => {
                        inner.abort_pump();
                        break;
                    }
                }
            }
            running_main.store(false, Ordering::SeqCst);
        });

        let client = Self {
            cmd_tx,
            stats,
            running,
        };
        Ok((client, event_rx))
    }

    /// 파일 스테이징 (idle → staged)
    pub async fn stage_files(&self, files: Vec<StagedFile>) -> Result<()> {
        self.cmd_tx
            .send(ClientCmd::Stage(files))
            .await
            .map_err(|_| Error::ChannelError)
    }

    /// 스테이징된 배치 송신 (staged → sending)
    pub async fn send_staged(&self) -> Result<()> {
        self.cmd_tx
            .send(ClientCmd::Send)
            .await
            .map_err(|_| Error::ChannelError)
    }

    /// 세션 리셋, 양쪽 모두 기준 상태로 복귀
    pub async fn reset_session(&self) -> Result<()> {
        self.cmd_tx
            .send(ClientCmd::Reset)
            .await
            .map_err(|_| Error::ChannelError)
    }

    /// 정지
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(ClientCmd::Stop).await;
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 송신 큐를 소켓으로 비우는 태스크
async fn drain_outbound(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_message(&mut write_half, &msg).await {
            debug!("writer stopped: {}", e);
            break;
        }
    }
}

/// 수신 루프: 프레임을 해독해서 커맨드 큐로 전달
async fn read_loop(
    mut read_half: OwnedReadHalf,
    cmd_tx: mpsc::Sender<ClientCmd>,
    running: Arc<AtomicBool>,
    max_frame_len: usize,
) {
    while running.load(Ordering::SeqCst) {
        match read_message(&mut read_half, max_frame_len).await {
            Ok(msg) => {
                if cmd_tx.send(ClientCmd::Inbound(msg)).await.is_err() {
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                let _ = cmd_tx.send(ClientCmd::Disconnected).await;
                break;
            }
            Err(e) => {
                warn!("read error: {}", e);
                let _ = cmd_tx.send(ClientCmd::Disconnected).await;
                break;
            }
        }
    }
}
