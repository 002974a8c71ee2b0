use std::sync::Arc;

use async_trait::async_trait;

use super::StageHandler;
use crate::pipeline::error::StageError;
use crate::pipeline::types::{Job, RenderJob, RenderPayload, SaveJob, WorkResult};
use crate::render::{RenderError, Renderer};

/// Render one job into exactly one save job.
pub fn render_job(renderer: &dyn Renderer, job: RenderJob) -> WorkResult {
    let kind = job.payload.artifact_kind();
    let bytes = match &job.payload {
        RenderPayload::Canvas { metadata, canvas } => renderer.render_canvas(metadata, canvas)?,
        RenderPayload::Date => renderer.render_date(job.commit.date)?,
        RenderPayload::TopPlacers { placers } => renderer.render_top_placers(placers)?,
        RenderPayload::CanvasControl {
            width,
            height,
            placers,
            top_placers,
        } => renderer.render_canvas_control(*width, *height, placers, top_placers)?,
    };

    Ok(vec![Job::Save(SaveJob {
        commit: job.commit,
        kind,
        bytes,
    })])
}

/// Render stage. Encoding runs on the blocking pool.
pub struct RenderStage {
    renderer: Arc<dyn Renderer>,
}

impl RenderStage {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl StageHandler for RenderStage {
    type Job = RenderJob;

    async fn process(&mut self, job: RenderJob) -> WorkResult {
        let renderer = Arc::clone(&self.renderer);
        match tokio::task::spawn_blocking(move || render_job(renderer.as_ref(), job)).await {
            Ok(result) => result,
            Err(e) => Err(StageError::Encode(RenderError::Encode(format!(
                "render task failed: {}",
                e
            )))),
        }
    }
}
