//! faceswap-client — Client side of the face-swap demo.
//!
//! Thin HTTP client for faceswapd. The client never talks to the image
//! host or the workflow provider directly: every step goes through the
//! daemon's proxies, which hold the credentials.
//!
//! [`Orchestrator`] drives one swap over a [`Session`]: two concurrent
//! uploads, one workflow call, then re-hosting of the workflow output.

pub mod api;
pub mod orchestrator;
pub mod session;

pub use api::{ClientError, FaceSwapApi, HttpFaceSwapApi};
pub use orchestrator::{rehost, Orchestrator, PipelineError, RehostError};
pub use session::{Phase, PreviewProvider, SelectedImage, SelectionError, Session, Slot};
