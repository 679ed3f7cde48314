//! CLI 모듈
//!
//! campus-assistant 명령어 정의 및 구현

use std::collections::HashSet;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::assistant::ChatAssistant;
use crate::config::{
    get_data_dir, mask_secret, Config, SPREADSHEET_PARTITION, TEXT_PARTITION,
};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::ingest::{collect_sources, write_model_marker, IngestPipeline, SourceKind};
use crate::knowledge::{LanceVectorStore, VectorStore};

/// `debug:` 명령의 검색 개수
pub const DEBUG_TOP_K: usize = 3;

/// 기본 코퍼스 경로
const DEFAULT_TEXT_SOURCE: &str = "./data/data.txt";
const DEFAULT_SPREADSHEET_SOURCE: &str = "./data/2025spring.xlsx";

const DIVIDER_WIDTH: usize = 50;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "campus-assistant")]
#[command(version, about = "캠퍼스 안내 질의응답 어시스턴트", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 대화형 질의응답
    Chat {
        /// 질의할 파티션
        #[arg(short, long)]
        partition: Option<String>,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 질의할 파티션
        #[arg(short, long)]
        partition: Option<String>,
    },

    /// 검색된 청크만 출력 (채팅 호출 없음)
    Search {
        /// 질문
        question: String,

        /// 결과 개수
        #[arg(short, long, default_value_t = DEBUG_TOP_K)]
        k: usize,

        /// 질의할 파티션
        #[arg(short, long)]
        partition: Option<String>,
    },

    /// 문서를 벡터 저장소에 수집
    ///
    /// 옵션이 없으면 ./data/data.txt, ./data/2025spring.xlsx를 수집합니다.
    Ingest {
        /// 텍스트 파일
        #[arg(long)]
        text: Option<PathBuf>,

        /// 스프레드시트 파일
        #[arg(long)]
        xlsx: Option<PathBuf>,

        /// 폴더 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 대상 파티션 (기본: 타입별 파티션)
        #[arg(short, long)]
        partition: Option<String>,

        /// 수집 전에 파티션 비우기
        #[arg(long)]
        rebuild: bool,
    },

    /// HTTP 서버 실행
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value_t = 8000)]
        port: u16,

        /// 질의할 파티션
        #[arg(short, long)]
        partition: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Chat { partition } => cmd_chat(partition).await,
        Commands::Ask {
            question,
            partition,
        } => cmd_ask(&question, partition).await,
        Commands::Search {
            question,
            k,
            partition,
        } => cmd_search(&question, k, partition).await,
        Commands::Ingest {
            text,
            xlsx,
            dir,
            partition,
            rebuild,
        } => cmd_ingest(text, xlsx, dir, partition, rebuild).await,
        Commands::Serve {
            host,
            port,
            partition,
        } => cmd_serve(&host, port, partition).await,
        Commands::Status => cmd_status().await,
    }
}

/// 설정 로드 + 파티션 지정
fn load_config(partition: Option<String>) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(partition) = partition {
        config.store.partition = partition;
    }
    Ok(config)
}

async fn build_assistant(partition: Option<String>) -> Result<ChatAssistant> {
    let config = load_config(partition)?;
    Ok(ChatAssistant::from_config(&config).await?)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 대화형 질의응답 명령어 (chat)
async fn cmd_chat(partition: Option<String>) -> Result<()> {
    let assistant = build_assistant(partition).await?;

    let lines = spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();

    run_repl(&assistant, lines, &mut stdout, interrupt_signal()).await
}

/// 단일 질의 명령어 (ask)
async fn cmd_ask(question: &str, partition: Option<String>) -> Result<()> {
    let assistant = build_assistant(partition).await?;

    println!("{}", assistant.answer(question).await);
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(question: &str, k: usize, partition: Option<String>) -> Result<()> {
    let assistant = build_assistant(partition).await?;

    println!("[*] Searching: \"{}\"", question);

    let results = assistant
        .debug_retrieve(question, k)
        .await
        .context("Search failed")?;

    if results.is_empty() {
        println!("\n[!] No matching chunks.");
        return Ok(());
    }

    println!("\n[OK] {} chunk(s):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [score: {:.4}] {} #{}",
            i + 1,
            result.similarity,
            result.source,
            result.chunk_index
        );
        println!("   {}", truncate_text(&result.chunk_text, 200));
        println!();
    }

    Ok(())
}

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    text: Option<PathBuf>,
    xlsx: Option<PathBuf>,
    dir: Option<PathBuf>,
    partition: Option<String>,
    rebuild: bool,
) -> Result<()> {
    let config = Config::from_env()?;
    let embedder = OpenAiEmbedding::new(&config.embedding, config.remote.clone())?;

    let targets = plan_ingest(text, xlsx, dir, partition.as_deref())?;
    if targets.is_empty() {
        println!("[!] No files to ingest.");
        return Ok(());
    }

    println!(
        "[*] Ingesting {} file(s) into {}",
        targets.len(),
        config.store.path.display()
    );

    let mut cleared = HashSet::new();
    let mut success_count = 0;
    let mut error_count = 0;

    for (i, target) in targets.iter().enumerate() {
        let store = LanceVectorStore::open(&config.store.path, &target.partition)
            .await
            .context("Failed to open vector store")?;

        if rebuild && cleared.insert(target.partition.clone()) {
            let removed = store.clear().await.context("Failed to clear partition")?;
            println!("[*] Cleared '{}' ({} chunks)", target.partition, removed);
        }

        let file_name = target
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        print!(
            "[{}/{}] [{}] {} -> {}... ",
            i + 1,
            targets.len(),
            target.kind.label(),
            file_name,
            target.partition
        );

        let pipeline = IngestPipeline::new(&embedder, &store);
        match pipeline.ingest_path(&target.path).await {
            Ok(report) => {
                write_model_marker(&config.store.path, &target.partition, embedder.model())?;
                println!("{} chunks", report.chunks);
                success_count += 1;
            }
            Err(e) => {
                println!("failed: {:#}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] Done: {} succeeded, {} failed", success_count, error_count);

    if error_count > 0 && success_count == 0 {
        bail!("Ingestion failed for every file");
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(host: &str, port: u16, partition: Option<String>) -> Result<()> {
    let assistant = build_assistant(partition).await?;

    let addr = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No address for {}:{}", host, port))?;

    crate::server::serve(Arc::new(assistant), addr).await
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("campus-assistant v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] Data directory: {}", get_data_dir().display());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("[!] {}", e);
            return Ok(());
        }
    };

    println!(
        "[OK] Embedding: {} @ {} (key {})",
        config.embedding.model,
        config.embedding.base_url,
        mask_secret(&config.embedding.api_key)
    );
    println!(
        "[OK] Chat: {} @ {} (key {}, temperature {})",
        config.chat.endpoint.model,
        config.chat.endpoint.base_url,
        mask_secret(&config.chat.endpoint.api_key),
        config.chat.temperature
    );
    println!(
        "[*] Vector store: {} (partition: {}, top_k: {})",
        config.store.path.display(),
        config.store.partition,
        config.store.top_k
    );

    let store = match LanceVectorStore::open_existing(&config.store.path, &config.store.partition)
        .await
    {
        Ok(store) => store,
        Err(e) => {
            println!("[!] {}", e);
            return Ok(());
        }
    };

    let partitions = store.list_partitions().await?;
    if partitions.is_empty() {
        println!("[!] No partitions. Run `campus-assistant ingest` first.");
    }

    for partition in partitions {
        let table = LanceVectorStore::open_existing(&config.store.path, &partition).await?;
        match table.count().await {
            Ok(count) => println!("     {}: {} chunks", partition, count),
            Err(e) => tracing::debug!("Failed to count '{}': {}", partition, e),
        }
    }

    Ok(())
}

// ============================================================================
// Ingest Planning
// ============================================================================

/// 수집 대상 파일 하나
#[derive(Debug, Clone, PartialEq)]
struct IngestTarget {
    path: PathBuf,
    kind: SourceKind,
    partition: String,
}

fn default_partition(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Text => TEXT_PARTITION,
        SourceKind::Spreadsheet => SPREADSHEET_PARTITION,
    }
}

/// 옵션에서 수집 대상 목록 결정
fn plan_ingest(
    text: Option<PathBuf>,
    xlsx: Option<PathBuf>,
    dir: Option<PathBuf>,
    partition: Option<&str>,
) -> Result<Vec<IngestTarget>> {
    let target = |path: PathBuf, kind: SourceKind| IngestTarget {
        path,
        kind,
        partition: partition.unwrap_or(default_partition(kind)).to_string(),
    };

    if text.is_none() && xlsx.is_none() && dir.is_none() {
        return Ok(vec![
            target(PathBuf::from(DEFAULT_TEXT_SOURCE), SourceKind::Text),
            target(PathBuf::from(DEFAULT_SPREADSHEET_SOURCE), SourceKind::Spreadsheet),
        ]);
    }

    let mut targets = Vec::new();

    if let Some(path) = text {
        targets.push(target(path, SourceKind::Text));
    }
    if let Some(path) = xlsx {
        targets.push(target(path, SourceKind::Spreadsheet));
    }
    if let Some(dir) = dir {
        for (path, kind) in collect_sources(&dir)? {
            targets.push(target(path, kind));
        }
    }

    Ok(targets)
}

// ============================================================================
// REPL
// ============================================================================

/// REPL 입력 한 줄의 해석
#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput<'a> {
    /// 종료 (quit, exit, 退出)
    Quit,
    /// 빈 줄
    Empty,
    /// `debug: <질문>` 검색만 수행
    Debug(&'a str),
    /// 일반 질문
    Ask(&'a str),
}

/// 입력 한 줄 해석
pub fn parse_input(line: &str) -> ReplInput<'_> {
    let line = line.trim();

    if line.is_empty() {
        return ReplInput::Empty;
    }

    let lower = line.to_lowercase();
    if matches!(lower.as_str(), "quit" | "exit" | "退出") {
        return ReplInput::Quit;
    }

    match line.strip_prefix("debug:") {
        Some(question) => ReplInput::Debug(question.trim()),
        None => ReplInput::Ask(line),
    }
}

/// 표준 입력을 한 줄씩 채널로 전달
///
/// 블로킹 읽기는 런타임 밖의 전용 스레드에서 수행하므로
/// 런타임 종료가 대기 중인 읽기를 기다리지 않습니다.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(1);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Ctrl-C 대기 (핸들러 등록 실패 시 끝나지 않음)
async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// 대화형 루프
///
/// EOF, 종료 명령, `interrupt` 완료 중 하나로 끝납니다.
/// `interrupt`는 입력 대기 중에도, 검색/답변 중에도 확인합니다.
pub async fn run_repl<W, I>(
    assistant: &ChatAssistant,
    mut lines: mpsc::Receiver<String>,
    writer: &mut W,
    interrupt: I,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);

    writer
        .write_all(
            b"=== Campus Assistant ===\n\
              Type 'quit' or 'exit' to leave.\n\
              Type 'debug: <question>' to see retrieved chunks.\n",
        )
        .await?;

    loop {
        writer.write_all(b"\nQuestion: ").await?;
        writer.flush().await?;

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = &mut interrupt => None,
        };

        let Some(line) = line else {
            writer.write_all(b"\n").await?;
            break;
        };

        match parse_input(&line) {
            ReplInput::Quit => break,
            ReplInput::Empty => continue,
            ReplInput::Debug(question) => {
                let retrieved = tokio::select! {
                    retrieved = assistant.debug_retrieve(question, DEBUG_TOP_K) => retrieved,
                    _ = &mut interrupt => {
                        writer.write_all(b"\nInterrupted.\n").await?;
                        break;
                    }
                };

                let output = match retrieved {
                    Ok(results) => {
                        let mut output = String::from("\n=== Retrieved chunks ===\n");
                        for (i, result) in results.iter().enumerate() {
                            output.push_str(&format!(
                                "Chunk {}:\n{}\n{}\n",
                                i + 1,
                                result.chunk_text,
                                "-".repeat(DIVIDER_WIDTH)
                            ));
                        }
                        output
                    }
                    Err(e) => format!("query failed: {}\n", e),
                };
                writer.write_all(output.as_bytes()).await?;
            }
            ReplInput::Ask(question) => {
                writer.write_all(b"Thinking...\n").await?;
                writer.flush().await?;

                let answer = tokio::select! {
                    answer = assistant.answer(question) => answer,
                    _ = &mut interrupt => {
                        writer.write_all(b"\nInterrupted.\n").await?;
                        break;
                    }
                };
                writer
                    .write_all(format!("\nAnswer: {}\n", answer).as_bytes())
                    .await?;
            }
        }
    }

    writer.write_all(b"Goodbye!\n").await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
