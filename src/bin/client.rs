//! ZDP 클라이언트 - Zero-click Drop Protocol
//!
//! 릴레이 서버에 접속해서 같은 네트워크의 상대와 파일을 주고받는 클라이언트
//! - --send 파일이 있으면 페어링 성립 시 자동 송신
//! - 없으면 수신 대기, 완료된 파일을 출력 디렉터리에 저장
//!
//! 사용법:
//!   cargo run --release --bin zdp-client -- [OPTIONS]
//!
//! 예시:
//!   # 파일 송신 (페어링되면 자동 전송)
//!   cargo run --release --bin zdp-client -- --server 192.168.0.10:9400 --send photo.jpg --send doc.pdf
//!
//!   # 수신 대기
//!   cargo run --release --bin zdp-client -- -s 192.168.0.10:9400 --output ./received

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zdp::session::SessionEvent;
use zdp::{Config, DropClient, ReceivedFile, StagedFile};

/// 클라이언트 설정
struct ClientConfig {
    server_addr: SocketAddr,
    send_paths: Vec<PathBuf>,
    output_dir: PathBuf,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9400".parse().unwrap(),
            send_paths: Vec::new(),
            output_dir: PathBuf::from("."),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--send" | "-f" => {
                if i + 1 < args.len() {
                    config.send_paths.push(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--chunk-size" => {
                if i + 1 < args.len() {
                    config.config.chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--bulk" => {
                config.config = Config::bulk();
            }
            "--low-spec" => {
                config.config = Config::low_spec();
            }
            "--help" | "-h" => {
                println!(
                    r#"ZDP Client - Zero-click Drop Protocol 클라이언트

같은 네트워크의 상대와 코드/QR 없이 파일 교환
- --send 파일이 있으면 송신 역할, 없으면 수신 대기

사용법:
  cargo run --release --bin zdp-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>    릴레이 서버 주소 (기본: 127.0.0.1:9400)
  -f, --send <PATH>      송신할 파일 (반복 지정 가능)
  -o, --output <DIR>     수신 파일 저장 디렉터리 (기본: .)
  --chunk-size <BYTES>   청크 크기 (기본: 16384)
  --bulk                 대용량 전송 프리셋
  --low-spec             저사양 기기 프리셋
  -h, --help             이 도움말 출력

예시:
  # 두 파일 송신
  cargo run --release --bin zdp-client -- -s 192.168.0.10:9400 -f a.jpg -f b.pdf

  # 수신 대기
  cargo run --release --bin zdp-client -- -s 192.168.0.10:9400 -o ./received
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// 수신 파일 저장, 경로 순회 방지를 위해 파일 이름 성분만 사용
fn save_received(output_dir: &Path, file: &ReceivedFile) -> std::io::Result<PathBuf> {
    let name = Path::new(&file.name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".into());

    let path = output_dir.join(name);
    std::fs::write(&path, &file.data)?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = parse_args();
    let is_sender = !client_config.send_paths.is_empty();

    info!("ZDP Client starting...");
    info!("Server address: {}", client_config.server_addr);
    info!("Role: {}", if is_sender { "sender" } else { "receiver" });

    // 송신 파일 로드
    let mut staged = Vec::new();
    for path in &client_config.send_paths {
        let file = StagedFile::from_path(path)?;
        info!("Staged: {} ({} bytes, {})", file.name, file.size, file.mime_type);
        staged.push(file);
    }

    if !is_sender {
        std::fs::create_dir_all(&client_config.output_dir)?;
    }

    let (client, mut events) =
        DropClient::connect(client_config.server_addr, client_config.config).await?;

    if is_sender {
        client.stage_files(staged).await?;
    }

    info!("Waiting for a peer on the same network...");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::PairingFound => {
                info!("Peer found");
                if is_sender {
                    info!("Sending batch...");
                    client.send_staged().await?;
                }
            }
            SessionEvent::PairingLost => {
                warn!("Peer lost, transfer abandoned");
                if is_sender {
                    break;
                }
                info!("Waiting for a peer on the same network...");
            }
            SessionEvent::PhaseChanged(phase) => {
                info!("Phase: {}", phase.as_str());
                if is_sender && phase == zdp::SessionPhase::Complete {
                    info!("Batch sent");
                    break;
                }
            }
            SessionEvent::FileCompleted { index, total, file } => {
                info!("Received {}/{}: {} ({} bytes)", index, total, file.name, file.size);
            }
            SessionEvent::BatchComplete(files) => {
                for file in &files {
                    let path = save_received(&client_config.output_dir, file)?;
                    info!("Saved {:?}", path);
                }
                break;
            }
        }
    }

    info!("{}", client.stats().summary());
    client.stop().await;
    Ok(())
}
