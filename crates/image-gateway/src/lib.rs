#![doc = include_str!("../README.md")]

pub mod docker;
pub mod error;
pub mod reference;

pub use docker::{BollardImageGateway, ImageGateway};
pub use error::ImageGatewayError;
pub use reference::{MAX_IMAGE_REF_LEN, validate_image_ref};
