//! 스캔 오케스트레이터 -- 제출, 백그라운드 실행, 조회 흐름 관리
//!
//! # 제출 흐름
//!
//! ```text
//! submit(image_ref, owner)
//!   ├─ validate_image_ref ─────────────── 400 InvalidImageRef
//!   ├─ MonthlyQuota::check ───────────── 403 QuotaExceeded
//!   ├─ AdmissionController::try_admit ── 429 CapacityExceeded
//!   ├─ ImageGateway::inspect_image ───── 404 ImageNotFound
//!   └─ [submit lock]
//!        ├─ MonthlyQuota::check (재확인)
//!        ├─ store.find(in progress) ───── 409 ScanAlreadyInProgress
//!        ├─ store.create → cache.insert
//!        └─ spawn supervisor ──────────── scan_id
//!
//! supervisor
//!   ├─ spawn run_scan (permit 소유) ─── init_db → scan → interpret
//!   ├─ join: panic이면 failed 기록
//!   └─ durable 레코드가 종료 상태면 cache.schedule_eviction
//! ```
//!
//! 제출 잠금은 저장소 확인과 레코드 생성 구간에만 잡으며, 컨테이너 런타임 호출은
//! 잠금 밖에서 수행합니다.
//!
//! 레코드 갱신은 해당 scan_id를 소유한 백그라운드 작업만 수행하며, 항상 durable
//! 저장소에 먼저 쓴 뒤 캐시에 반영합니다. 종료 상태 쓰기는 제한된 횟수만큼
//! 재시도하고, 끝내 실패하면 캐시 항목을 유지하여 조회가 캐시의 종료 상태를
//! 따르게 합니다. 백그라운드 에러는 레코드에만 기록되고 제출자에게 전파되지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use docklens_core::error::StorageError;
use docklens_core::metrics as m;
use docklens_core::service::HealthStatus;
use docklens_core::types::{ImageInfo, ScanRecord, ScanStatus, ScanUpdate, make_scan_id};
use docklens_image_gateway::{ImageGateway, validate_image_ref};

use crate::admission::{AdmissionController, AdmissionPermit};
use crate::cache::ScanCache;
use crate::config::{OrphanPolicy, ScanEngineConfig};
use crate::error::ScanEngineError;
use crate::interpreter::interpret;
use crate::invoker::{ProcessRunner, ScannerInvoker};
use crate::quota::{MonthlyQuota, month_start};
use crate::reports::{self, HistoryPage, PageRequest, ScanSummary};
use crate::store::{ScanFilter, ScanRecordStore};

/// 대기 중 레코드의 진행 문구
pub const PROGRESS_QUEUED: &str = "Initializing scan...";
/// DB 초기화 단계 진행 문구
pub const PROGRESS_DB_INIT: &str = "Initializing vulnerability database...";
/// 스캔 단계 진행 문구
pub const PROGRESS_SCANNING: &str = "Scanning image...";
/// 캐시 항목이 없는 진행 중 레코드의 진행 문구
pub const PROGRESS_FALLBACK: &str = "Scan in progress";

pub const ERROR_DB_INIT: &str = "Failed to initialize vulnerability database";
pub const ERROR_PARSE: &str = "Failed to parse scan results";
pub const ERROR_TASK_ABORTED: &str = "Scan task aborted unexpectedly";
pub const ERROR_INTERRUPTED: &str = "Scan interrupted by service restart";

/// 종료 상태 durable 쓰기 시도 횟수
const TERMINAL_WRITE_ATTEMPTS: u32 = 3;
/// 종료 상태 쓰기 재시도 초기 대기 (시도마다 2배)
const TERMINAL_WRITE_BACKOFF: Duration = Duration::from_millis(100);
/// 같은 밀리초에 생성된 scan_id 충돌 시 시도할 최대 후보 수
const MAX_SCAN_ID_CANDIDATES: i64 = 1_000;

/// 스캔 오케스트레이터
///
/// 복제 비용이 낮은 핸들이며, 모든 복제본이 같은 상태를 공유합니다.
pub struct ScanOrchestrator<G, R, S> {
    inner: Arc<Inner<G, R, S>>,
}

impl<G, R, S> Clone for ScanOrchestrator<G, R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<G, R, S> {
    config: ScanEngineConfig,
    gateway: Arc<G>,
    invoker: ScannerInvoker<R>,
    store: Arc<S>,
    cache: ScanCache,
    admission: AdmissionController,
    quota: MonthlyQuota,
    /// 중복 확인부터 레코드 생성까지를 직렬화
    submit_lock: Mutex<()>,
}

impl<G, R, S> ScanOrchestrator<G, R, S>
where
    G: ImageGateway,
    R: ProcessRunner,
    S: ScanRecordStore,
{
    /// 설정을 검증하고 오케스트레이터를 생성합니다.
    pub fn new(
        config: ScanEngineConfig,
        gateway: Arc<G>,
        runner: Arc<R>,
        store: Arc<S>,
    ) -> Result<Self, ScanEngineError> {
        config.validate()?;

        let inner = Inner {
            invoker: ScannerInvoker::new(runner, &config),
            cache: ScanCache::new(config.cache_retention()),
            admission: AdmissionController::new(config.max_parallel_scans),
            quota: MonthlyQuota::new(config.monthly_scan_limit),
            submit_lock: Mutex::new(()),
            gateway,
            store,
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// 스캔을 제출하고 즉시 scan_id를 반환합니다.
    pub async fn submit(
        &self,
        image_ref: &str,
        owner_id: Option<&str>,
    ) -> Result<String, ScanEngineError> {
        let result = self.try_submit(image_ref, owner_id).await;
        metrics::counter!(m::SCANS_SUBMITTED_TOTAL, m::LABEL_RESULT => submission_label(&result))
            .increment(1);
        result
    }

    async fn try_submit(
        &self,
        image_ref: &str,
        owner_id: Option<&str>,
    ) -> Result<String, ScanEngineError> {
        validate_image_ref(image_ref)?;

        if let Some(owner) = owner_id {
            self.check_quota(owner).await?;
        }

        let permit = self.inner.admission.try_admit()?;
        let image = self.inner.gateway.inspect_image(image_ref).await?;
        debug!(image_ref, image = %image, "image resolved");

        let _guard = self.inner.submit_lock.lock().await;
        let now = Utc::now();

        // 잠금 밖 확인 이후 같은 소유자의 제출이 끼어들었을 수 있음
        if let Some(owner) = owner_id {
            self.check_quota(owner).await?;
        }

        for existing in self
            .inner
            .store
            .find(&ScanFilter::in_progress_for(image_ref))
            .await?
        {
            if self.is_active(&existing.scan_id).await {
                return Err(ScanEngineError::ScanAlreadyInProgress {
                    scan_id: existing.scan_id,
                });
            }
        }

        let scan_id = allocate_scan_id(self.inner.store.as_ref(), image_ref, now).await?;
        let record = ScanRecord::pending(&scan_id, image_ref, owner_id.map(str::to_owned), now);
        self.inner.store.create(record.clone()).await?;
        self.inner
            .cache
            .insert(ScanRecord {
                progress: Some(PROGRESS_QUEUED.to_owned()),
                ..record
            })
            .await;

        info!(scan_id = %scan_id, image_ref, owner = owner_id.unwrap_or("-"), "scan submitted");
        spawn_supervisor(
            Arc::clone(&self.inner),
            scan_id.clone(),
            image_ref.to_owned(),
            image,
            permit,
        );
        Ok(scan_id)
    }

    /// durable 레코드가 진행 중이어도 캐시가 종료 상태를 갖고 있으면 비활성입니다.
    async fn is_active(&self, scan_id: &str) -> bool {
        self.inner
            .cache
            .get(scan_id)
            .await
            .is_none_or(|cached| !cached.status.is_terminal())
    }

    async fn check_quota(&self, owner: &str) -> Result<(), ScanEngineError> {
        if self.inner.quota.is_unlimited() {
            return Ok(());
        }
        let since = month_start(Utc::now());
        let used = self
            .inner
            .store
            .find(&ScanFilter::owned_by(owner))
            .await?
            .iter()
            .filter(|r| r.start_time >= since)
            .count();
        self.inner
            .quota
            .check(owner, u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// 스캔 상태를 조회합니다.
    ///
    /// durable 레코드가 종료 상태면 그대로, 진행 중이면 캐시의 진행 문구를 덧붙여
    /// 반환합니다. 종료 상태 쓰기에 실패해 durable 레코드가 뒤처진 경우에는 캐시의
    /// 종료 상태를 반환합니다. durable 레코드가 없으면 캐시를 확인합니다.
    /// `caller`가 주어지고 레코드의 소유자와 다르면 `Forbidden`입니다.
    pub async fn status(
        &self,
        scan_id: &str,
        caller: Option<&str>,
    ) -> Result<ScanRecord, ScanEngineError> {
        let record = match self.inner.store.get(scan_id).await? {
            Some(record) if record.status.is_terminal() => record,
            Some(mut record) => match self.inner.cache.get(scan_id).await {
                Some(cached) if cached.status.is_terminal() => cached,
                cached => {
                    record.progress = Some(
                        cached
                            .and_then(|c| c.progress)
                            .unwrap_or_else(|| PROGRESS_FALLBACK.to_owned()),
                    );
                    record
                }
            },
            None => self
                .inner
                .cache
                .get(scan_id)
                .await
                .ok_or_else(|| ScanEngineError::NotFound(scan_id.to_owned()))?,
        };

        if let (Some(caller), Some(owner)) = (caller, record.owner_id.as_deref())
            && caller != owner
        {
            return Err(ScanEngineError::Forbidden {
                scan_id: scan_id.to_owned(),
            });
        }
        Ok(record)
    }

    /// 소유자의 스캔 이력을 최신순으로 페이지 단위 조회합니다.
    pub async fn history(
        &self,
        owner_id: &str,
        request: PageRequest,
    ) -> Result<HistoryPage, ScanEngineError> {
        let records = self
            .inner
            .store
            .find(&ScanFilter::owned_by(owner_id))
            .await?;
        Ok(reports::paginate(&records, request))
    }

    /// 소유자의 스캔 요약을 계산합니다.
    pub async fn summary(&self, owner_id: &str) -> Result<ScanSummary, ScanEngineError> {
        let records = self
            .inner
            .store
            .find(&ScanFilter::owned_by(owner_id))
            .await?;
        Ok(reports::summarize(&records, Utc::now()))
    }

    /// 시작 시 남아 있는 진행 중 레코드를 정책에 따라 처리하고 그 수를 반환합니다.
    pub async fn reconcile_orphans(&self) -> Result<usize, ScanEngineError> {
        let orphans = self.inner.store.find(&ScanFilter::in_progress()).await?;
        if orphans.is_empty() {
            return Ok(0);
        }

        match self.inner.config.orphan_policy {
            OrphanPolicy::Keep => {
                warn!(
                    count = orphans.len(),
                    "found scans left in progress by a previous run, keeping them as-is"
                );
            }
            OrphanPolicy::Fail => {
                for orphan in &orphans {
                    let update = ScanUpdate::Failed {
                        error: ERROR_INTERRUPTED.to_owned(),
                    };
                    match self
                        .inner
                        .store
                        .update(&orphan.scan_id, update, Utc::now())
                        .await
                    {
                        Ok(_) => info!(scan_id = %orphan.scan_id, "marked interrupted scan as failed"),
                        Err(e) => {
                            warn!(scan_id = %orphan.scan_id, error = %e, "failed to mark orphaned scan")
                        }
                    }
                }
            }
        }
        Ok(orphans.len())
    }

    /// 현재 실행 중인 스캔 수
    pub fn in_flight(&self) -> usize {
        self.inner.admission.in_flight()
    }

    /// 최대 동시 실행 수
    pub fn max_parallel_scans(&self) -> usize {
        self.inner.admission.max()
    }

    /// 진행 문구 캐시에 남아 있는 스캔 수
    pub async fn cached_scans(&self) -> usize {
        self.inner.cache.len().await
    }

    pub fn config(&self) -> &ScanEngineConfig {
        &self.inner.config
    }

    /// 컨테이너 런타임 연결과 실행 여유를 종합한 헬스 상태
    pub async fn health(&self) -> HealthStatus {
        if let Err(e) = self.inner.gateway.ping().await {
            return HealthStatus::Unhealthy(format!("container runtime unreachable: {e}"));
        }
        if self.inner.admission.available() == 0 {
            return HealthStatus::Degraded(format!(
                "at capacity ({} scans running)",
                self.inner.admission.max()
            ));
        }
        HealthStatus::Healthy
    }
}

// --- 백그라운드 실행 ---

fn spawn_supervisor<G, R, S>(
    inner: Arc<Inner<G, R, S>>,
    scan_id: String,
    image_ref: String,
    image: ImageInfo,
    permit: AdmissionPermit,
) where
    G: ImageGateway,
    R: ProcessRunner,
    S: ScanRecordStore,
{
    tokio::spawn(async move {
        let started = Instant::now();

        let worker = tokio::spawn({
            let inner = Arc::clone(&inner);
            let scan_id = scan_id.clone();
            let image_ref = image_ref.clone();
            async move {
                // 작업이 어떤 경로로 끝나든 permit은 여기서 해제
                let _permit = permit;
                inner.run_scan(&scan_id, &image_ref, image).await
            }
        });

        let status = match worker.await {
            Ok(status) => status,
            Err(e) => {
                error!(scan_id = %scan_id, error = %e, "scan task aborted");
                inner
                    .record(
                        &scan_id,
                        ScanUpdate::Failed {
                            error: ERROR_TASK_ABORTED.to_owned(),
                        },
                    )
                    .await;
                ScanStatus::Failed
            }
        };

        metrics::counter!(m::SCANS_FINISHED_TOTAL, m::LABEL_STATUS => status.as_str())
            .increment(1);
        metrics::histogram!(m::SCAN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let lagging = match inner
            .store
            .find(&ScanFilter::in_progress_for(&image_ref))
            .await
        {
            Ok(records) => records.iter().any(|r| r.scan_id == scan_id),
            Err(_) => true,
        };
        if lagging {
            warn!(scan_id = %scan_id, "terminal state not persisted, keeping cache entry");
        } else {
            inner.cache.schedule_eviction(&scan_id);
        }
    });
}

/// `{image_ref}_{epoch_millis}` 중 저장소에 없는 scan_id를 고릅니다.
///
/// 같은 밀리초에 이미 레코드가 있으면 다음 밀리초를 사용합니다. 제출 잠금 안에서
/// 호출되어야 합니다.
async fn allocate_scan_id<S: ScanRecordStore>(
    store: &S,
    image_ref: &str,
    now: DateTime<Utc>,
) -> Result<String, StorageError> {
    for offset in 0..MAX_SCAN_ID_CANDIDATES {
        let candidate = make_scan_id(image_ref, now + TimeDelta::milliseconds(offset));
        if store.get(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(StorageError::Duplicate(make_scan_id(image_ref, now)))
}

impl<G, R, S> Inner<G, R, S>
where
    G: ImageGateway,
    R: ProcessRunner,
    S: ScanRecordStore,
{
    /// 스캔 1건을 끝까지 실행하고 최종 상태를 반환합니다.
    async fn run_scan(&self, scan_id: &str, image_ref: &str, admitted: ImageInfo) -> ScanStatus {
        self.record(
            scan_id,
            ScanUpdate::Running {
                progress: PROGRESS_DB_INIT.to_owned(),
            },
        )
        .await;
        info!(scan_id, image_ref, "scan running");

        if let Err(e) = self.invoker.init_db().await {
            let err = ScanEngineError::DbInitFailed(e);
            error!(scan_id, error = %err, "scan failed");
            return self.fail(scan_id, ERROR_DB_INIT).await;
        }

        self.record(scan_id, ScanUpdate::Progress(PROGRESS_SCANNING.to_owned()))
            .await;

        // 폴백 대상은 스캔 시점의 다이제스트
        let image = match self.gateway.inspect_image(image_ref).await {
            Ok(image) => image,
            Err(e) => {
                warn!(scan_id, error = %e, "could not re-resolve image, using digest from submission");
                admitted
            }
        };

        let output = match self
            .invoker
            .scan(image_ref, image.fallback_ref(), self.config.timeout_secs)
            .await
        {
            Ok(output) => output,
            Err(ScanEngineError::ScanExecutionFailed { primary, fallback }) => {
                error!(scan_id, primary = %primary, fallback = %fallback, "scan failed");
                let message =
                    format!("Scan failed: image reference: {primary}; image id: {fallback}");
                return self.fail(scan_id, &message).await;
            }
            Err(e) => {
                error!(scan_id, error = %e, "scan failed");
                return self.fail(scan_id, &format!("Scan failed: {e}")).await;
            }
        };

        match interpret(&output.stdout) {
            Ok(result) => {
                info!(
                    scan_id,
                    target = %output.target,
                    used_fallback = output.used_fallback,
                    total = result.counts.total(),
                    critical = result.counts.critical,
                    high = result.counts.high,
                    "scan completed"
                );
                self.record(
                    scan_id,
                    ScanUpdate::Completed {
                        counts: result.counts,
                        warnings: output.warnings,
                        raw_report: Some(result.report),
                    },
                )
                .await;
                ScanStatus::Completed
            }
            Err(e) => {
                error!(scan_id, error = %e, "scan failed");
                self.fail(scan_id, ERROR_PARSE).await
            }
        }
    }

    async fn fail(&self, scan_id: &str, message: &str) -> ScanStatus {
        self.record(
            scan_id,
            ScanUpdate::Failed {
                error: message.to_owned(),
            },
        )
        .await;
        ScanStatus::Failed
    }

    /// durable 저장소에 먼저 쓰고 캐시에 반영합니다.
    ///
    /// 종료 상태는 제한된 횟수만큼 재시도하며, 그 외 실패는 로그만 남깁니다.
    async fn record(&self, scan_id: &str, update: ScanUpdate) {
        let now = Utc::now();
        let attempts = if update.target_status().is_some_and(|s| s.is_terminal()) {
            TERMINAL_WRITE_ATTEMPTS
        } else {
            1
        };
        let mut backoff = TERMINAL_WRITE_BACKOFF;

        for attempt in 1..=attempts {
            match self.store.update(scan_id, update.clone(), now).await {
                Ok(_) => break,
                Err(e @ (StorageError::Transition(_) | StorageError::NotFound(_))) => {
                    error!(scan_id, error = %e, "failed to persist scan update");
                    break;
                }
                Err(e) if attempt < attempts => {
                    warn!(scan_id, attempt, error = %e, "failed to persist scan update, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    error!(scan_id, attempts, error = %e, "failed to persist scan update");
                }
            }
        }
        self.cache.apply(scan_id, update, now).await;
    }
}

fn submission_label(result: &Result<String, ScanEngineError>) -> &'static str {
    match result {
        Ok(_) => "accepted",
        Err(ScanEngineError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(ScanEngineError::ImageNotFound(_)) => "image_not_found",
        Err(ScanEngineError::ScanAlreadyInProgress { .. }) => "already_in_progress",
        Err(ScanEngineError::QuotaExceeded { .. }) => "quota_exceeded",
        Err(ScanEngineError::InvalidImageRef(_)) => "invalid",
        Err(_) => "error",
    }
}
