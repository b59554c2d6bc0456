//! Per-user swap session: the two selected images, their previews, and
//! where the current run stands.

use faceswap_core::{HostedImageRef, ImagePayload, MAX_IMAGE_BYTES};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const FILE_TOO_LARGE: &str = "File size must be less than 32MB";
pub const SELECT_BOTH: &str = "Please select both images first";

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("File size must be less than 32MB ({size} bytes)")]
    TooLarge { size: usize },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which of the two images a selection fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The image providing the face.
    Face,
    /// The image whose face gets replaced.
    Base,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::Face => 0,
            Slot::Base => 1,
        }
    }
}

/// Where a swap run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Invoking,
    Rehosting,
    Done,
    Error,
}

impl Phase {
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Invoking | Phase::Rehosting)
    }
}

/// An image picked by the user.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read an image from disk.
    pub async fn from_path(path: &Path) -> Result<Self, SelectionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SelectionError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(path.display().to_string(), bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Creates and releases local previews of selected images.
pub trait PreviewProvider: Send + Sync {
    fn create(&self, image: &SelectedImage) -> String;
    fn revoke(&self, url: &str);
}

/// A live preview; released when dropped.
struct Preview {
    url: String,
    provider: Arc<dyn PreviewProvider>,
}

impl Drop for Preview {
    fn drop(&mut self) {
        self.provider.revoke(&self.url);
    }
}

struct Selection {
    image: SelectedImage,
    preview: Preview,
}

/// State of one swap session.
///
/// Previews are released exactly once each: when a newer selection
/// replaces them, or when the session is dropped.
pub struct Session {
    previews: Arc<dyn PreviewProvider>,
    slots: [Option<Selection>; 2],
    phase: Phase,
    error: Option<String>,
    face_url: Option<HostedImageRef>,
    base_url: Option<HostedImageRef>,
    result_url: Option<HostedImageRef>,
}

impl Session {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        Self {
            previews,
            slots: [None, None],
            phase: Phase::Idle,
            error: None,
            face_url: None,
            base_url: None,
            result_url: None,
        }
    }

    /// Put `image` into `slot`, replacing (and releasing) any earlier pick.
    ///
    /// Oversized images are refused and leave the slot untouched.
    pub fn select(&mut self, slot: Slot, image: SelectedImage) -> Result<(), SelectionError> {
        self.error = None;
        if image.size() > MAX_IMAGE_BYTES {
            self.error = Some(FILE_TOO_LARGE.to_string());
            return Err(SelectionError::TooLarge { size: image.size() });
        }

        let preview = Preview {
            url: self.previews.create(&image),
            provider: self.previews.clone(),
        };
        tracing::debug!(?slot, name = %image.name, bytes = image.size(), preview = %preview.url, "image selected");
        self.slots[slot.index()] = Some(Selection { image, preview });
        Ok(())
    }

    pub fn selected(&self, slot: Slot) -> Option<&SelectedImage> {
        self.slots[slot.index()].as_ref().map(|s| &s.image)
    }

    pub fn preview_url(&self, slot: Slot) -> Option<&str> {
        self.slots[slot.index()]
            .as_ref()
            .map(|s| s.preview.url.as_str())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_busy()
    }

    /// Both images picked and no run in flight.
    pub fn can_submit(&self) -> bool {
        self.slots.iter().all(Option::is_some) && !self.is_loading()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn uploaded(&self) -> Option<(&HostedImageRef, &HostedImageRef)> {
        self.face_url.as_ref().zip(self.base_url.as_ref())
    }

    pub fn result_url(&self) -> Option<&HostedImageRef> {
        self.result_url.as_ref()
    }

    /// Start a run: returns the two payloads to upload, face first.
    pub(crate) fn begin(&mut self) -> Option<(ImagePayload, ImagePayload)> {
        let face = self.selected(Slot::Face)?.bytes.clone();
        let base = self.selected(Slot::Base)?.bytes.clone();
        self.error = None;
        self.face_url = None;
        self.base_url = None;
        self.result_url = None;
        self.enter(Phase::Uploading);
        Some((ImagePayload::Bytes(face), ImagePayload::Bytes(base)))
    }

    pub(crate) fn record_uploads(&mut self, face: HostedImageRef, base: HostedImageRef) {
        self.face_url = Some(face);
        self.base_url = Some(base);
        self.enter(Phase::Invoking);
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "session phase");
        self.phase = phase;
    }

    pub(crate) fn finish(&mut self, result: HostedImageRef) {
        self.result_url = Some(result);
        self.enter(Phase::Done);
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.enter(Phase::Error);
    }
}
