//! 이미지 게이트웨이 에러 타입
//!
//! [`ImageGatewayError`]는 Docker 데몬과의 통신에서 발생하는 모든 에러를 표현합니다.
//! `From<ImageGatewayError> for DocklensError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use docklens_core::error::{ConfigError, DocklensError, ImageError};

/// 이미지 게이트웨이 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ImageGatewayError {
    /// 이미지 참조 형식 오류
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// 이미지가 로컬 런타임에 없음
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Docker 데몬 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ImageGatewayError> for DocklensError {
    fn from(err: ImageGatewayError) -> Self {
        match err {
            ImageGatewayError::InvalidReference(r) => {
                DocklensError::Image(ImageError::InvalidReference(r))
            }
            ImageGatewayError::ImageNotFound(r) => DocklensError::Image(ImageError::NotFound(r)),
            ImageGatewayError::DockerConnection(msg) => DocklensError::Image(ImageError::Unreachable(msg)),
            ImageGatewayError::DockerApi(msg) => DocklensError::Image(ImageError::Api(msg)),
            ImageGatewayError::Config { field, reason } => {
                DocklensError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
