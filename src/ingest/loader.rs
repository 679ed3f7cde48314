//! 소스 로더 - 텍스트/스프레드시트 파일에서 텍스트 추출
//!
//! - 텍스트 파일: UTF-8로 직접 읽기
//! - 스프레드시트: calamine으로 시트별 행을 한 줄씩 텍스트화

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::Reader;
use regex::Regex;
use walkdir::WalkDir;

// ============================================================================
// Source Kind
// ============================================================================

/// 지원하는 소스 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 일반 텍스트
    Text,
    /// 스프레드시트 (xlsx, xls, ods)
    Spreadsheet,
}

impl SourceKind {
    /// 확장자로 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "csv" => Some(SourceKind::Text),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(SourceKind::Spreadsheet),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Text => "TXT",
            SourceKind::Spreadsheet => "XLS",
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// 파일에서 문서 텍스트 로드
pub async fn load_source(path: &Path, kind: SourceKind) -> Result<String> {
    match kind {
        SourceKind::Text => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path)),
        SourceKind::Spreadsheet => {
            // calamine은 동기 I/O + CPU 바운드
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || load_spreadsheet(&path))
                .await
                .context("Spreadsheet extraction task failed")?
        }
    }
}

/// 스프레드시트의 모든 시트를 텍스트로 변환
fn load_spreadsheet(path: &Path) -> Result<String> {
    let mut workbook = calamine::open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet: {:?}", path))?;

    let whitespace = Regex::new(r"\s+").context("Invalid whitespace pattern")?;
    let mut sections = Vec::new();

    for sheet_name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}' in {:?}: {}", sheet_name, path, e);
                continue;
            }
        };

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        if let Some(section) = render_sheet(&sheet_name, &rows, &whitespace) {
            sections.push(section);
        }
    }

    Ok(sections.join("\n\n"))
}

/// 시트 하나를 텍스트로 렌더링
///
/// 빈 셀은 건너뛰고, 셀 내부 공백은 한 칸으로 정규화합니다.
/// 내용이 없는 시트는 `None`입니다.
fn render_sheet(sheet_name: &str, rows: &[Vec<String>], whitespace: &Regex) -> Option<String> {
    let lines: Vec<String> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| whitespace.replace_all(cell.trim(), " ").into_owned())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(format!("## {}\n{}", sheet_name, lines.join("\n")))
}

// ============================================================================
// Directory Collection
// ============================================================================

/// 디렉토리에서 지원 파일 수집 (경로 정렬)
pub fn collect_sources(dir: &Path) -> Result<Vec<(PathBuf, SourceKind)>> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk directory: {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }

        // 숨김 파일 및 Office 잠금 파일(~$) 제외
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.starts_with("~$") {
            continue;
        }

        if let Some(kind) = SourceKind::from_path(entry.path()) {
            files.push((entry.into_path(), kind));
        }
    }

    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
