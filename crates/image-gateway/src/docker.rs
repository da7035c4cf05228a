//! Docker API abstraction for image lookups.
//!
//! The [`ImageGateway`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardImageGateway`] while tests use `MockImageGateway`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  ScanOrchestrator│
//! └────────┬─────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ImageGateway │ (trait)
//!   └─────────────┘
//!        │     │
//!        ▼     ▼
//!   ┌───────┐ ┌────┐
//!   │Bollard│ │Mock│
//!   └───┬───┘ └────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use docklens_image_gateway::{BollardImageGateway, ImageGateway};
//!
//! let gateway = BollardImageGateway::connect_local()?;
//! let info = gateway.inspect_image("nginx:1.27").await?;
//! println!("{info}");
//! # Ok::<(), docklens_image_gateway::ImageGatewayError>(())
//! ```

use std::future::Future;
use std::sync::Arc;

use docklens_core::config::DockerConfig;
use docklens_core::types::ImageInfo;
use tracing::debug;

use crate::error::ImageGatewayError;
use crate::reference::validate_image_ref;

/// Trait abstracting the container runtime image API.
///
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async contexts.
///
/// # Error Handling
///
/// - **404 errors**: Converted to `ImageGatewayError::ImageNotFound`
/// - **Connection errors**: Wrapped as `ImageGatewayError::DockerConnection`
/// - **Invalid references**: Rejected before any API call with `ImageGatewayError::InvalidReference`
pub trait ImageGateway: Send + Sync + 'static {
    /// Resolves an image reference (name, name:tag, or id) to its metadata.
    ///
    /// # Errors
    ///
    /// - `ImageGatewayError::ImageNotFound`: The image is not present locally (404)
    /// - `ImageGatewayError::DockerApi`: Any other API failure
    fn inspect_image(
        &self,
        image_ref: &str,
    ) -> impl Future<Output = Result<ImageInfo, ImageGatewayError>> + Send;

    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `ImageGatewayError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), ImageGatewayError>> + Send;
}

/// Production gateway implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
#[derive(Clone)]
pub struct BollardImageGateway {
    docker: Arc<bollard::Docker>,
}

impl BollardImageGateway {
    /// Connects using bollard's local defaults (honors `DOCKER_HOST`).
    ///
    /// # Errors
    ///
    /// Returns `ImageGatewayError::DockerConnection` if the client cannot be created.
    pub fn connect_local() -> Result<Self, ImageGatewayError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ImageGatewayError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self::from_docker(docker))
    }

    /// Connects to Docker using a specific Unix socket path.
    pub fn connect_with_socket(
        socket_path: &str,
        timeout_secs: u64,
    ) -> Result<Self, ImageGatewayError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            ImageGatewayError::DockerConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self::from_docker(docker))
    }

    /// Connects to a remote Docker daemon over plain HTTP (`tcp://` or `http://`).
    pub fn connect_with_http(addr: &str, timeout_secs: u64) -> Result<Self, ImageGatewayError> {
        let addr = match addr.strip_prefix("tcp://") {
            Some(rest) => format!("http://{rest}"),
            None => addr.to_owned(),
        };
        let docker =
            bollard::Docker::connect_with_http(&addr, timeout_secs, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ImageGatewayError::DockerConnection(format!(
                        "failed to connect to docker at {addr}: {e}"
                    ))
                })?;
        Ok(Self::from_docker(docker))
    }

    /// Builds a gateway from the `[docker]` configuration section.
    ///
    /// An empty `host` selects `socket_path`; otherwise the scheme of `host`
    /// decides the transport.
    pub fn from_config(config: &DockerConfig) -> Result<Self, ImageGatewayError> {
        if config.host.is_empty() {
            debug!(socket = %config.socket_path, "connecting to docker via socket");
            return Self::connect_with_socket(&config.socket_path, config.timeout_secs);
        }

        debug!(host = %config.host, "connecting to docker via host");
        if let Some(path) = config.host.strip_prefix("unix://") {
            Self::connect_with_socket(path, config.timeout_secs)
        } else if config.host.starts_with("tcp://") || config.host.starts_with("http://") {
            Self::connect_with_http(&config.host, config.timeout_secs)
        } else {
            Err(ImageGatewayError::Config {
                field: "docker.host".to_owned(),
                reason: format!("unsupported scheme in '{}'", config.host),
            })
        }
    }

    fn from_docker(docker: bollard::Docker) -> Self {
        Self {
            docker: Arc::new(docker),
        }
    }
}

impl ImageGateway for BollardImageGateway {
    async fn inspect_image(&self, image_ref: &str) -> Result<ImageInfo, ImageGatewayError> {
        validate_image_ref(image_ref)?;

        let details = self
            .docker
            .inspect_image(image_ref)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => ImageGatewayError::ImageNotFound(image_ref.to_owned()),
                other => ImageGatewayError::DockerApi(format!("inspect image failed: {other}")),
            })?;

        let id = details.id.ok_or_else(|| {
            ImageGatewayError::DockerApi(format!("inspect image '{image_ref}' returned no id"))
        })?;

        Ok(ImageInfo {
            id,
            repo_tags: details.repo_tags.unwrap_or_default(),
            size_bytes: details
                .size
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }

    async fn ping(&self) -> Result<(), ImageGatewayError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ImageGatewayError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 이미지 게이트웨이
///
/// 설정 가능한 응답을 반환하여 Docker 없이도 테스트할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockImageGateway {
    /// 참조 문자열별 조회 결과
    pub images: std::collections::HashMap<String, ImageInfo>,
    /// 연결 실패를 시뮬레이션할지 여부
    pub unreachable: bool,
}

#[cfg(test)]
impl MockImageGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// `image_ref`로 조회 가능한 이미지를 추가합니다.
    pub fn with_image(mut self, image_ref: &str, info: ImageInfo) -> Self {
        self.images.insert(image_ref.to_owned(), info);
        self
    }

    /// 모든 호출이 연결 실패를 반환하도록 설정합니다.
    pub fn with_unreachable_daemon(mut self) -> Self {
        self.unreachable = true;
        self
    }
}

#[cfg(test)]
impl ImageGateway for MockImageGateway {
    async fn inspect_image(&self, image_ref: &str) -> Result<ImageInfo, ImageGatewayError> {
        validate_image_ref(image_ref)?;
        if self.unreachable {
            return Err(ImageGatewayError::DockerConnection("mock daemon down".to_owned()));
        }
        self.images
            .get(image_ref)
            .cloned()
            .ok_or_else(|| ImageGatewayError::ImageNotFound(image_ref.to_owned()))
    }

    async fn ping(&self) -> Result<(), ImageGatewayError> {
        if self.unreachable {
            return Err(ImageGatewayError::DockerConnection("mock daemon down".to_owned()));
        }
        Ok(())
    }
}
