//! Full-path scenario: a run payload of 250 points streams, bakes, and
//! renders across every zoom band, and clicks resolve to the right points.

use std::sync::Arc;
use std::time::Duration;

use artmap_core::run::{RunConfig, RunPoint, RunResponse};
use artmap_core::transform::{Transform, Viewport};
use artmap_core::types::{AppState, Point, PRIMARY_THUMB_SIZE};
use artmap_render::bake::BakeParams;
use artmap_render::draw::ActiveLod;
use artmap_render::surface::RasterSurface;
use artmap_stream::pipeline::StreamParams;
use artmap_stream::source::MemorySource;
use artmap_view::{close_detail, hit_test, run_pipeline, ViewContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const POINTS: usize = 250;

fn synthetic_run() -> RunResponse {
    let mut rng = StdRng::seed_from_u64(42);
    let points = (0..POINTS)
        .map(|i| RunPoint {
            filename: format!("art{i:03}.jpg"),
            artist: format!("artist{}", i % 12),
            x: rng.gen::<f64>(),
            y: rng.gen::<f64>(),
        })
        .collect();
    RunResponse {
        config: RunConfig {
            config_id: 1,
            method: "umap".into(),
            subset_strategy: "random".into(),
            subset_size: POINTS as u32,
            runtime: 3.2,
            created_at: "2025-05-01 12:00:00".into(),
        },
        points,
    }
}

fn source_for(response: &RunResponse) -> MemorySource {
    let mut source = MemorySource::new();
    for (i, point) in response.points.iter().enumerate() {
        source.insert_solid(&point.filename, 8, [(i % 255) as u8, 60, 120, 255]);
    }
    source
}

fn test_params() -> (StreamParams, BakeParams) {
    (
        StreamParams {
            concurrency: 8,
            retries: 1,
            retry_base: Duration::from_millis(1),
            sizes: vec![PRIMARY_THUMB_SIZE],
        },
        BakeParams {
            max_edge: 512,
            min_tile_edge: 32,
            thumb_px: 8,
            background: [0, 0, 0, 0],
        },
    )
}

#[tokio::test]
async fn full_run_renders_every_band_and_resolves_clicks() {
    let response = synthetic_run();
    let source = Arc::new(source_for(&response));
    let (stream_params, bake_params) = test_params();

    let viewport = Viewport::new(800.0, 600.0);
    let mut ctx = ViewContext::new(viewport);
    let points: Vec<Point> = response.points.iter().cloned().map(Point::from).collect();
    let report = run_pipeline(&mut ctx, points, source, stream_params, &bake_params)
        .await
        .expect("pipeline completes");

    assert_eq!(ctx.state(), AppState::Viewing);
    assert_eq!(report.success, POINTS);
    assert_eq!(report.total, POINTS);
    assert!(report.errors.is_empty());

    // Every zoom band renders without failing, on the same context.
    let fit = viewport.fit_transform();
    let mut surface = RasterSurface::new(800, 600).unwrap();

    ctx.set_transform(Transform::new(fit.x, fit.y, 0.3));
    let frame = ctx.render(&mut surface);
    assert_eq!(frame.lod, ActiveLod::Full);
    assert_eq!(frame.tiles_drawn, 1);

    ctx.set_transform(Transform::new(fit.x, fit.y, 1.0));
    let frame = ctx.render(&mut surface);
    assert!(matches!(frame.lod, ActiveLod::Quadrant(_)));

    ctx.set_transform(Transform::new(fit.x, fit.y, 4.0));
    let frame = ctx.render(&mut surface);
    assert!(matches!(frame.lod, ActiveLod::Quads { .. }));
    assert!(frame.tiles_drawn >= 1);

    ctx.set_transform(Transform::new(fit.x, fit.y, 15.0));
    let frame = ctx.render(&mut surface);
    assert!(matches!(frame.lod, ActiveLod::Dynamic { .. }));

    // Hit-testing at the full band: clicking inside the first point's
    // recorded bounds lands on it (index 0 is first in scan order).
    ctx.set_transform(fit);
    ctx.render(&mut surface);
    assert_eq!(ctx.active_lod(), ActiveLod::Full);

    let bounds = *ctx
        .points
        .get(0)
        .unwrap()
        .bounds_for(&artmap_core::tiles::TileKey::full())
        .expect("baked point has full-tile bounds");
    let (cx, cy) = bounds.center();
    let (sx, sy) = ctx.transform.tile_to_screen(cx, cy);

    let hit = hit_test(&ctx, sx, sy).expect("click inside bounds hits");
    assert_eq!(hit, 0);
    let expected = ctx.points.get(hit).unwrap().filename.clone();
    ctx.enter_detail(hit).unwrap();
    assert_eq!(ctx.state(), AppState::Detail);
    assert_eq!(ctx.selected_point().unwrap().filename, expected);
    close_detail(&mut ctx).unwrap();

    // A click far from every point leaves the state untouched.
    assert_eq!(ctx.hit_test(-5000.0, -5000.0), None);
    assert_eq!(ctx.state(), AppState::Viewing);
}

#[tokio::test]
async fn deterministic_failures_still_reach_viewing_with_placeholders() {
    let response = synthetic_run();
    let mut source = source_for(&response);
    let failing = ["art010.jpg", "art100.jpg", "art200.jpg"];
    for name in failing {
        source.fail_always(name);
    }
    let (stream_params, bake_params) = test_params();

    let mut ctx = ViewContext::new(Viewport::new(640.0, 480.0));
    let points: Vec<Point> = response.points.iter().cloned().map(Point::from).collect();
    let report = run_pipeline(&mut ctx, points, Arc::new(source), stream_params, &bake_params)
        .await
        .unwrap();

    assert_eq!(report.success, POINTS - failing.len());
    assert_eq!(report.errors.len(), failing.len());

    // Placeholder substitution means no point is missing a primary handle,
    // so the whole pyramid still bakes.
    for index in 0..ctx.points.len() {
        assert!(ctx.points.get(index).unwrap().primary_thumb().is_some());
    }
    assert!(ctx.pyramid.as_ref().unwrap().full().is_baked());
    assert_eq!(ctx.state(), AppState::Viewing);
}
