//! ZDP 릴레이 서버 - Zero-click Drop Protocol
//!
//! 같은 네트워크 주소의 연결들을 자동 페어링하고 메시지를 릴레이하는 서버
//! - 연결 즉시 피어 주소 기반 룸 배정, 명시적 페어링 단계 없음
//! - 페이로드 해석 없이 룸 상대에게 그대로 전달
//!
//! 사용법:
//!   cargo run --release --bin zdp-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 실행
//!   cargo run --release --bin zdp-server -- --bind 0.0.0.0:9400
//!
//!   # 대용량 전송용 프레임 한도 확대
//!   cargo run --release --bin zdp-server -- -b 0.0.0.0:9400 --bulk

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use zdp::{Config, RelayServer};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    stats_interval_secs: u64,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".parse().unwrap(),
            stats_interval_secs: 30,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--max-frame" => {
                if i + 1 < args.len() {
                    config.config.max_frame_len = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--queue-size" => {
                if i + 1 < args.len() {
                    config.config.outbound_queue_size =
                        args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--stats-interval" => {
                if i + 1 < args.len() {
                    config.stats_interval_secs = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--bulk" => {
                config.config = Config::bulk();
            }
            "--help" | "-h" => {
                println!(
                    r#"ZDP Server - Zero-click Drop Protocol 릴레이 서버

같은 네트워크의 두 단말을 자동 페어링하고 파일 전송을 릴레이
- 코드/QR 없는 제로클릭 페어링 (같은 공인 주소 = 같은 룸)
- 페이로드 해석 없는 순서 보존 릴레이

사용법:
  cargo run --release --bin zdp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>        바인드 주소 (기본: 0.0.0.0:9400)
  --max-frame <BYTES>      최대 프레임 길이 (기본: 1048576)
  --queue-size <N>         연결당 송신 큐 용량 (기본: 1024)
  --stats-interval <SECS>  통계 로그 주기, 0이면 끔 (기본: 30)
  --bulk                   대용량 전송 프리셋
  -h, --help               이 도움말 출력

예시:
  # 기본 실행
  cargo run --release --bin zdp-server

  # LAN 공개 + 대용량 프리셋
  cargo run --release --bin zdp-server -- -b 0.0.0.0:9400 --bulk
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_config = parse_args();

    info!("ZDP Server starting...");
    info!("Bind address: {}", server_config.bind_addr);
    info!("Max frame: {} bytes", server_config.config.max_frame_len);

    let server = RelayServer::bind(server_config.bind_addr, server_config.config).await?;
    info!("Listening on {}", server.local_addr()?);

    // 주기적 통계 로그
    if server_config.stats_interval_secs > 0 {
        let stats = server.stats_handle();
        let interval = Duration::from_secs(server_config.stats_interval_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                info!("{}", stats.read().summary());
            }
        });
    }

    server.run().await?;
    Ok(())
}
