//! Orchestration of one run: load points, stream thumbnails, bake tiles,
//! then hand the view back to the host. Background work reports results
//! that are applied synchronously here, on the interaction thread, and a
//! generation check drops anything a newer run superseded.

use std::sync::Arc;
use std::time::Instant;

use artmap_core::run::{ArtistInfo, RunConfig, RunRequest};
use artmap_core::types::{AppState, Point, ThumbHandle};
use artmap_render::bake::BakeParams;
use artmap_stream::client::{ApiClient, ClientError};
use artmap_stream::pipeline::{
    stream_thumbnails, LoadReport, StreamError, StreamParams, StreamProgress, ThumbJob,
};
use artmap_stream::source::ImageSource;
use thiserror::Error;

use crate::context::{ViewContext, ViewError};
use crate::interact::{target_for_action, Action, Animator};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Upstream(#[from] ClientError),

    /// A newer run replaced the point collection while this one was still
    /// streaming; its results were discarded.
    #[error("run superseded before results could be applied")]
    Superseded,
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Drive a fresh point collection through
/// `LoadingData → LoadingImages → CreatingBitmaps → Viewing`.
///
/// Baking is sequenced strictly after the thumbnail batch completes. A bake
/// that fails per-cell still reaches `Viewing` (the LOD selector routes
/// around bad cells); a catastrophic surface failure leaves the context in
/// permanent dynamic rendering.
pub async fn run_pipeline<S: ImageSource>(
    ctx: &mut ViewContext,
    points: Vec<Point>,
    source: Arc<S>,
    stream_params: StreamParams,
    bake_params: &BakeParams,
) -> ControllerResult<LoadReport> {
    ctx.transition(AppState::LoadingData)?;
    let generation = ctx.install_run(points);

    ctx.transition(AppState::LoadingImages)?;
    let jobs = ThumbJob::for_points(&ctx.points);
    let progress = Arc::new(StreamProgress::new(jobs.len()));
    ctx.set_status(progress.status_line());
    let outcome = stream_thumbnails(source, jobs, stream_params, Arc::clone(&progress)).await?;
    if !ctx.points.apply_thumbs(generation, outcome.thumbs) {
        return Err(ControllerError::Superseded);
    }
    ctx.set_status(progress.status_line());

    ctx.transition(AppState::CreatingBitmaps)?;
    ctx.bake(bake_params);

    ctx.transition(AppState::Viewing)?;
    Ok(outcome.report)
}

/// Submit a run request and drive the full pipeline on its response.
///
/// An upstream failure is surfaced as a status message only; no point or
/// tile state is mutated, and the previous view (if any) is restored so the
/// user can retry.
pub async fn execute_run<S: ImageSource>(
    ctx: &mut ViewContext,
    client: &ApiClient,
    request: &RunRequest,
    source: Arc<S>,
    stream_params: StreamParams,
    bake_params: &BakeParams,
) -> ControllerResult<(RunConfig, LoadReport)> {
    ctx.transition(AppState::LoadingData)?;
    ctx.set_status(format!(
        "running {} ({}x{})",
        request.method, request.subset_strategy, request.subset_size
    ));

    let response = match client.run(request).await {
        Ok(response) => response,
        Err(err) => {
            ctx.set_status(format!("run failed: {err}"));
            if !ctx.points.is_empty() {
                let _ = ctx.transition(AppState::Viewing);
            }
            return Err(err.into());
        }
    };

    let points: Vec<Point> = response.points.into_iter().map(Point::from).collect();
    log::info!(
        "run {} returned {} points in {:.2}s",
        response.config.config_id,
        points.len(),
        response.config.runtime
    );
    let report = run_pipeline(ctx, points, source, stream_params, bake_params).await?;
    Ok((response.config, report))
}

/// Everything the detail panel needs for one selected point.
#[derive(Debug)]
pub struct DetailView {
    pub filename: String,
    pub artist: String,
    pub artist_info: Option<ArtistInfo>,
    /// Higher-resolution image, fetched out of band; None when the fetch
    /// failed (the host keeps showing the thumbnail).
    pub image: Option<ThumbHandle>,
}

/// Select a point, enter the detail state, and fetch the higher-resolution
/// image plus artist metadata out of band.
pub async fn open_detail<S: ImageSource>(
    ctx: &mut ViewContext,
    index: usize,
    source: &S,
    artists: &[ArtistInfo],
) -> ControllerResult<DetailView> {
    ctx.enter_detail(index)?;
    let (filename, artist) = {
        let point = ctx
            .selected_point()
            .ok_or(ViewError::UnknownPoint { index })?;
        (point.filename.clone(), point.artist.clone())
    };

    let image = match source.fetch_detail(&filename).await {
        Ok(bytes) => match image::load_from_memory(&bytes) {
            Ok(decoded) => Some(ThumbHandle::new(decoded.to_rgba8())),
            Err(err) => {
                log::warn!("could not decode detail image for {filename}: {err}");
                None
            }
        },
        Err(err) => {
            log::warn!("could not fetch detail image for {filename}: {err}");
            None
        }
    };
    let artist_info = artists.iter().find(|a| a.artist == artist).cloned();

    Ok(DetailView {
        filename,
        artist,
        artist_info,
        image,
    })
}

/// Leave the detail state, restoring `Viewing`.
pub fn close_detail(ctx: &mut ViewContext) -> ControllerResult<()> {
    ctx.transition(AppState::Viewing)?;
    Ok(())
}

/// Apply a keyboard action. Zoom actions start an eased animation toward
/// their target, updating the shared transform immediately; `ExitDetail`
/// restores `Viewing`. Returns whether anything changed.
pub fn apply_action(
    ctx: &mut ViewContext,
    animator: &mut Animator,
    action: Action,
    now: Instant,
) -> bool {
    if action == Action::ExitDetail {
        if ctx.state() == AppState::Detail {
            let _ = ctx.transition(AppState::Viewing);
            return true;
        }
        return false;
    }
    let Some(target) = target_for_action(action, &ctx.transform, &ctx.viewport) else {
        return false;
    };
    animator.animate_to(ctx.transform, target, now);
    if let Some(first) = animator.tick(now) {
        ctx.set_transform(first);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use artmap_core::transform::Viewport;
    use artmap_core::types::PRIMARY_THUMB_SIZE;
    use artmap_stream::source::MemorySource;
    use std::time::Duration;

    fn quick_stream_params() -> StreamParams {
        StreamParams {
            concurrency: 4,
            retries: 0,
            retry_base: Duration::from_millis(1),
            sizes: vec![PRIMARY_THUMB_SIZE],
        }
    }

    fn small_bake_params() -> BakeParams {
        BakeParams {
            max_edge: 128,
            min_tile_edge: 8,
            thumb_px: 8,
            background: [0, 0, 0, 0],
        }
    }

    fn seeded(n: usize) -> (Vec<Point>, MemorySource) {
        let mut source = MemorySource::new();
        let points = (0..n)
            .map(|i| {
                let filename = format!("img{i}.jpg");
                source.insert_solid(&filename, 8, [i as u8, 10, 10, 255]);
                Point::new(filename, "artist".into(), (i % 7) as f64, (i / 7) as f64)
            })
            .collect();
        (points, source)
    }

    #[tokio::test]
    async fn test_pipeline_reaches_viewing_with_baked_pyramid() {
        let mut ctx = ViewContext::new(Viewport::new(320.0, 240.0));
        let (points, source) = seeded(30);

        let report = run_pipeline(
            &mut ctx,
            points,
            Arc::new(source),
            quick_stream_params(),
            &small_bake_params(),
        )
        .await
        .unwrap();

        assert_eq!(ctx.state(), AppState::Viewing);
        assert_eq!(report.success, 30);
        assert!(ctx.pyramid.as_ref().unwrap().full().is_baked());
        assert!(ctx.status().starts_with("loaded 30/30"));
    }

    #[tokio::test]
    async fn test_upstream_failure_sets_status_and_keeps_state() {
        let mut ctx = ViewContext::new(Viewport::new(100.0, 100.0));
        // Nothing listens here; the request fails fast.
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let request = RunRequest::new("umap");

        let result = execute_run(
            &mut ctx,
            &client,
            &request,
            Arc::new(MemorySource::new()),
            quick_stream_params(),
            &small_bake_params(),
        )
        .await;

        assert!(matches!(result, Err(ControllerError::Upstream(_))));
        assert!(ctx.status().starts_with("run failed:"));
        assert!(ctx.points.is_empty());
        assert!(ctx.pyramid.is_none());
    }

    #[tokio::test]
    async fn test_open_and_close_detail() {
        let mut ctx = ViewContext::new(Viewport::new(320.0, 240.0));
        let (points, source) = seeded(5);
        let source = Arc::new(source);
        run_pipeline(
            &mut ctx,
            points,
            Arc::clone(&source),
            quick_stream_params(),
            &small_bake_params(),
        )
        .await
        .unwrap();

        let artists = vec![ArtistInfo {
            artist: "artist".into(),
            nationality: Some("Dutch".into()),
            years: Some("1853 - 1890".into()),
            bio: None,
        }];
        let detail = open_detail(&mut ctx, 3, &*source, &artists).await.unwrap();
        assert_eq!(ctx.state(), AppState::Detail);
        assert_eq!(detail.filename, "img3.jpg");
        assert_eq!(detail.artist_info.as_ref().unwrap().nationality.as_deref(), Some("Dutch"));
        assert!(detail.image.is_some());
        assert_eq!(ctx.selected_point().unwrap().filename, "img3.jpg");

        close_detail(&mut ctx).unwrap();
        assert_eq!(ctx.state(), AppState::Viewing);
        assert!(ctx.selected_point().is_none());
    }

    #[tokio::test]
    async fn test_detail_image_failure_degrades_to_none() {
        let mut ctx = ViewContext::new(Viewport::new(320.0, 240.0));
        let (points, mut source) = seeded(2);
        source.fail_always("img1.jpg");
        let source = Arc::new(source);
        // img1 streams as a placeholder but the run still completes.
        run_pipeline(
            &mut ctx,
            points,
            Arc::clone(&source),
            quick_stream_params(),
            &small_bake_params(),
        )
        .await
        .unwrap();

        let detail = open_detail(&mut ctx, 1, &*source, &[]).await.unwrap();
        assert!(detail.image.is_none());
        assert!(detail.artist_info.is_none());
        assert_eq!(ctx.state(), AppState::Detail);
    }

    #[test]
    fn test_zoom_action_starts_animation_and_updates_transform() {
        let mut ctx = ViewContext::new(Viewport::new(320.0, 240.0));
        ctx.install_run(vec![Point::new("a.jpg".into(), "a".into(), 0.0, 0.0)]);
        let mut animator = Animator::new();
        let before = ctx.transform;

        assert!(apply_action(&mut ctx, &mut animator, Action::ZoomIn, Instant::now()));
        assert!(animator.is_animating());

        // Completion applies the exact target exactly once.
        let target = target_for_action(Action::ZoomIn, &before, &ctx.viewport).unwrap();
        let done = animator
            .tick(Instant::now() + crate::interact::ZOOM_ANIMATION_DURATION * 2)
            .unwrap();
        assert_eq!(done, target);
    }
}
