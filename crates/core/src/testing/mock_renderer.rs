//! Mock renderer for testing.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::canvas::{CanvasMetadata, Placer};
use crate::pipeline::ArtifactKind;
use crate::render::{RenderError, Renderer};

#[derive(Debug, Default)]
struct State {
    renders: Vec<ArtifactKind>,
    fail_kind: Option<ArtifactKind>,
}

/// Mock implementation of the Renderer trait.
///
/// Returns small marker payloads (`"<kind>"` as bytes) instead of PNGs and
/// records which kinds were rendered.
#[derive(Debug, Clone, Default)]
pub struct MockRenderer {
    state: Arc<Mutex<State>>,
}

impl MockRenderer {
    /// Create a new mock renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every render of `kind` fail.
    pub fn fail_kind(&self, kind: ArtifactKind) {
        self.lock().fail_kind = Some(kind);
    }

    /// Kinds rendered so far, in call order.
    pub fn rendered(&self) -> Vec<ArtifactKind> {
        self.lock().renders.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, kind: ArtifactKind) -> Result<Vec<u8>, RenderError> {
        let mut state = self.lock();
        if state.fail_kind == Some(kind) {
            return Err(RenderError::Encode(format!("{} rendering disabled", kind)));
        }
        state.renders.push(kind);
        Ok(kind.as_str().as_bytes().to_vec())
    }
}

impl Renderer for MockRenderer {
    fn render_canvas(
        &self,
        metadata: &CanvasMetadata,
        _canvas: &[u8],
    ) -> Result<Vec<u8>, RenderError> {
        if metadata.width == 0 || metadata.height == 0 {
            return Err(RenderError::EmptyImage {
                width: metadata.width,
                height: metadata.height,
            });
        }
        self.render(ArtifactKind::CanvasRender)
    }

    fn render_date(&self, _date: DateTime<Utc>) -> Result<Vec<u8>, RenderError> {
        self.render(ArtifactKind::DateRender)
    }

    fn render_top_placers(&self, _placers: &[Placer]) -> Result<Vec<u8>, RenderError> {
        self.render(ArtifactKind::TopPlacersRender)
    }

    fn render_canvas_control(
        &self,
        width: u32,
        height: u32,
        _placers: &[u32],
        _top_placers: &[Placer],
    ) -> Result<Vec<u8>, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage { width, height });
        }
        self.render(ArtifactKind::CanvasControlRender)
    }
}
