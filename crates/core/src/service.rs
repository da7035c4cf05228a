//! 서비스 공통 trait 보조 타입 — dyn 호환 future, 헬스 상태

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

/// dyn 호환 trait에서 반환하는 boxed future
///
/// RPITIT(`impl Future`) 메서드를 가진 trait은 `dyn`으로 사용할 수 없으므로,
/// 동적 디스패치가 필요한 경계에서는 이 타입을 반환합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 구성 요소 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능/기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }

    /// 상태 문자열 (`healthy`, `degraded`, `unhealthy`)
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded(_) => "degraded",
            Self::Unhealthy(_) => "unhealthy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".to_owned()).is_healthy());
        assert!(HealthStatus::Unhealthy("down".to_owned()).is_unhealthy());
    }

    #[test]
    fn health_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Degraded("at capacity".to_owned())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "at capacity");

        let json = serde_json::to_value(HealthStatus::Healthy).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
