//! 이미지 참조 검증
//!
//! 이미지 참조는 URL 경로에서 들어와 스캐너 인자로 그대로 전달되므로
//! 허용 문자 집합을 좁게 유지합니다.

use crate::error::ImageGatewayError;

/// 이미지 참조 최대 길이
pub const MAX_IMAGE_REF_LEN: usize = 255;

/// 이미지 참조를 검증합니다.
///
/// - 길이 1-255
/// - 허용 문자: `[A-Za-z0-9._:/@-]`
/// - `-`로 시작할 수 없음 (명령행 옵션으로 해석되는 것을 막음)
pub fn validate_image_ref(image_ref: &str) -> Result<(), ImageGatewayError> {
    if image_ref.is_empty() || image_ref.len() > MAX_IMAGE_REF_LEN {
        return Err(ImageGatewayError::InvalidReference(format!(
            "length {} (must be 1-{MAX_IMAGE_REF_LEN})",
            image_ref.len()
        )));
    }
    if image_ref.starts_with('-') {
        return Err(ImageGatewayError::InvalidReference(
            "must not start with '-'".to_owned(),
        ));
    }
    if let Some(c) = image_ref
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '@' | '-')))
    {
        return Err(ImageGatewayError::InvalidReference(format!(
            "contains disallowed character {c:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_references() {
        for r in [
            "nginx",
            "nginx:1.27",
            "library/nginx:latest",
            "ghcr.io/org/app:v1.2.3",
            "registry.local:5000/team/app@sha256:abcdef0123",
            "3f0e1c2d4b5a",
            "my_app-build.7",
        ] {
            validate_image_ref(r).unwrap_or_else(|e| panic!("{r} rejected: {e}"));
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_image_ref("").is_err());
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(MAX_IMAGE_REF_LEN + 1);
        assert!(validate_image_ref(&long).is_err());
        let max = "a".repeat(MAX_IMAGE_REF_LEN);
        assert!(validate_image_ref(&max).is_ok());
    }

    #[test]
    fn rejects_shell_and_whitespace() {
        for r in ["nginx;rm -rf /", "nginx latest", "a$(id)", "x|y", "img\n", "a&b"] {
            assert!(
                matches!(
                    validate_image_ref(r),
                    Err(ImageGatewayError::InvalidReference(_))
                ),
                "{r:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_option_like_reference() {
        assert!(validate_image_ref("--help").is_err());
        assert!(validate_image_ref("-q").is_err());
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(validate_image_ref("nginx:최신").is_err());
    }
}
