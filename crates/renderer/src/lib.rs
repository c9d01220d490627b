//! HTTP clients for the external rendering and vision services.
//!
//! Each client implements one collaborator trait from
//! `tokenlift_core::collaborators` and converts transport and HTTP
//! failures into a [`StageError`](tokenlift_core::error::StageError) with
//! an explicit retry classification.

pub mod client;
pub mod component;
pub mod error;
pub mod page;
pub mod vision;

pub use component::HttpComponentRenderer;
pub use error::RendererError;
pub use page::{HttpPageHandle, HttpPageRenderer};
pub use vision::VisionClient;
