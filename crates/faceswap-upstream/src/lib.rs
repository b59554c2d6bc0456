//! faceswap-upstream — Clients for the external services behind the proxies.
//!
//! Two seams, each a trait with one reqwest-backed implementation:
//! [`ImageHost`] (ImgBB) stores images and hands back public URLs,
//! [`WorkflowEngine`] (Coze) runs the face-swap workflow. Credentials are
//! passed per call by the proxies, which own the configuration.

pub mod coze;
pub mod error;
pub mod imgbb;

#[cfg(test)]
mod testing;

pub use coze::{CozeWorkflow, WorkflowEngine, DEFAULT_COZE_ENDPOINT};
pub use error::UpstreamError;
pub use imgbb::{ImageHost, ImgbbHost, UploadEncoding, DEFAULT_IMGBB_ENDPOINT};
