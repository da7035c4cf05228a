//! 외부 스캐너 호출
//!
//! [`ProcessRunner`]는 프로세스 1회 실행을 추상화하고, [`ScannerInvoker`]는 그 위에서
//! 스캐너 인자 구성과 2단계 시도(이미지 참조 → 다이제스트)를 담당합니다.
//!
//! ```text
//! scan(primary, fallback)
//!   ├─ run(primary) ── ok ──────────────────────────────▶ ScanOutput
//!   └─ err ─▶ run(fallback) ── ok ──────────────────────▶ ScanOutput (used_fallback)
//!                 └─ err ─▶ ScanExecutionFailed { primary, fallback }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use docklens_core::metrics as m;

use crate::config::ScanEngineConfig;
use crate::error::{ScanEngineError, ToolError};

/// 에러 메시지에 남길 stderr 최대 길이
const MAX_STDERR_IN_ERROR: usize = 2048;

/// 프로세스 1회 실행 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// 강제 종료 시한
    pub hard_timeout: Duration,
    /// stdout/stderr 각각의 캡처 한도 (바이트)
    pub max_output_bytes: usize,
}

/// 성공한 프로세스 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// 외부 프로세스 실행 추상화
///
/// 종료 코드가 0이 아니면 `ToolError::NonZeroExit`로 실패해야 합니다.
pub trait ProcessRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &str,
        args: &[String],
        limits: RunLimits,
    ) -> impl Future<Output = Result<ProcessOutput, ToolError>> + Send;
}

/// `tokio::process` 기반 실행기
///
/// 시한을 넘기거나 출력 한도를 넘긴 자식 프로세스는 kill됩니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limits: RunLimits,
    ) -> Result<ProcessOutput, ToolError> {
        debug!(program, ?args, "spawning process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                binary: program.to_owned(),
                source,
            })?;

        let outcome = tokio::time::timeout(
            limits.hard_timeout,
            collect_output(&mut child, limits.max_output_bytes),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    warn!(program, error = %e, "failed to kill timed out process");
                }
                Err(ToolError::TimedOut {
                    secs: limits.hard_timeout.as_secs(),
                })
            }
        }
    }
}

async fn collect_output(child: &mut Child, limit: usize) -> Result<ProcessOutput, ToolError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::Io(std::io::Error::other("stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::Io(std::io::Error::other("stderr not captured")))?;

    let (stdout, stderr, status) = tokio::try_join!(
        read_bounded(stdout, limit),
        read_bounded(stderr, limit),
        async { child.wait().await.map_err(ToolError::Io) },
    )?;

    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    if !status.success() {
        return Err(ToolError::NonZeroExit {
            code: status.code(),
            stderr: truncate(stderr.trim(), MAX_STDERR_IN_ERROR),
        });
    }

    Ok(ProcessOutput { stdout, stderr })
}

async fn read_bounded<R: AsyncRead + Unpin>(reader: R, limit: usize) -> Result<Vec<u8>, ToolError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();
    reader.take(cap).read_to_end(&mut buf).await?;
    if buf.len() > limit {
        return Err(ToolError::OutputTooLarge { limit });
    }
    Ok(buf)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// 스캔 성공 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutput {
    /// 스캐너 JSON 출력
    pub stdout: Vec<u8>,
    /// 스캐너 stderr (공백 제거 후 비어 있으면 `None`)
    pub warnings: Option<String>,
    /// 실제로 성공한 대상
    pub target: String,
    /// 다이제스트로 재시도해서 성공했는지 여부
    pub used_fallback: bool,
}

/// 스캐너 명령 구성 및 2단계 실행
pub struct ScannerInvoker<R> {
    runner: Arc<R>,
    binary: String,
    cache_dir: PathBuf,
    max_output_bytes: usize,
    db_init_timeout: Duration,
}

impl<R: ProcessRunner> ScannerInvoker<R> {
    pub fn new(runner: Arc<R>, config: &ScanEngineConfig) -> Self {
        Self {
            runner,
            binary: config.binary.clone(),
            cache_dir: config.cache_dir.clone(),
            max_output_bytes: config.max_output_bytes,
            db_init_timeout: config.db_init_timeout(),
        }
    }

    /// DB 다운로드 인자: `image --cache-dir <dir> --download-db-only`
    pub fn db_init_args(&self) -> Vec<String> {
        vec![
            "image".to_owned(),
            "--cache-dir".to_owned(),
            self.cache_dir.display().to_string(),
            "--download-db-only".to_owned(),
        ]
    }

    /// 스캔 인자: `image --cache-dir <dir> --format json --timeout <N>s <target>`
    pub fn scan_args(&self, target: &str, timeout_secs: u64) -> Vec<String> {
        vec![
            "image".to_owned(),
            "--cache-dir".to_owned(),
            self.cache_dir.display().to_string(),
            "--format".to_owned(),
            "json".to_owned(),
            "--timeout".to_owned(),
            format!("{timeout_secs}s"),
            target.to_owned(),
        ]
    }

    /// 취약점 DB를 내려받습니다. 이미 최신이면 스캐너가 바로 종료하므로 반복 호출해도 됩니다.
    pub async fn init_db(&self) -> Result<(), ToolError> {
        let limits = RunLimits {
            hard_timeout: self.db_init_timeout,
            max_output_bytes: self.max_output_bytes,
        };
        self.runner
            .run(&self.binary, &self.db_init_args(), limits)
            .await
            .map(|_| ())
    }

    /// `primary`로 스캔하고, 실패하면 `fallback`으로 정확히 한 번 재시도합니다.
    pub async fn scan(
        &self,
        primary: &str,
        fallback: &str,
        timeout_secs: u64,
    ) -> Result<ScanOutput, ScanEngineError> {
        let limits = RunLimits {
            hard_timeout: Duration::from_secs(
                timeout_secs + crate::config::HARD_TIMEOUT_GRACE_SECS,
            ),
            max_output_bytes: self.max_output_bytes,
        };

        let primary_err = match self
            .runner
            .run(&self.binary, &self.scan_args(primary, timeout_secs), limits)
            .await
        {
            Ok(output) => return Ok(into_scan_output(output, primary, false)),
            Err(e) => e,
        };

        warn!(
            image_ref = primary,
            fallback,
            error = %primary_err,
            "scan by image reference failed, retrying with image id"
        );
        metrics::counter!(m::SCANNER_FALLBACK_TOTAL).increment(1);

        match self
            .runner
            .run(&self.binary, &self.scan_args(fallback, timeout_secs), limits)
            .await
        {
            Ok(output) => Ok(into_scan_output(output, fallback, true)),
            Err(fallback_err) => Err(ScanEngineError::ScanExecutionFailed {
                primary: primary_err,
                fallback: fallback_err,
            }),
        }
    }
}

fn into_scan_output(output: ProcessOutput, target: &str, used_fallback: bool) -> ScanOutput {
    let warnings = Some(output.stderr.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    ScanOutput {
        stdout: output.stdout,
        warnings,
        target: target.to_owned(),
        used_fallback,
    }
}
