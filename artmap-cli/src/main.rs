use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use artmap_core::run::{RunRequest, RunResponse};
use artmap_core::transform::Viewport;
use artmap_core::types::Point;
use artmap_render::bake::BakeParams;
use artmap_render::surface::RasterSurface;
use artmap_stream::client::ApiClient;
use artmap_stream::pipeline::StreamParams;
use artmap_stream::source::{HttpImageSource, ImageSource, MemorySource};
use artmap_view::{run_pipeline, ViewContext};

#[derive(Parser)]
#[command(name = "artmap")]
#[command(about = "Artmap - zoomable thumbnail scatter-plot renderer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a DR run to a server and render the result to a PNG
    Run {
        /// Run service base URL (e.g. http://localhost:5000)
        #[arg(long)]
        server: String,

        /// DR method to run
        #[arg(long, default_value = "umap")]
        method: String,

        /// Subset sampling strategy
        #[arg(long, default_value = "random")]
        subset_strategy: String,

        /// Subset size (clamped to 1..=500)
        #[arg(long, default_value = "250")]
        subset_size: u32,

        /// Overwrite an existing config row
        #[arg(long)]
        config_id: Option<i64>,

        /// Image host base URL; placeholders are used when omitted
        #[arg(long)]
        images: Option<String>,

        #[command(flatten)]
        frame: FrameArgs,
    },

    /// Render a stored run payload (JSON) to a PNG
    Render {
        /// Run response JSON file ({config, points})
        #[arg(long)]
        input: PathBuf,

        /// Image host base URL; placeholders are used when omitted
        #[arg(long)]
        images: Option<String>,

        #[command(flatten)]
        frame: FrameArgs,
    },

    /// List methods, subset strategies, and a method's parameter schema
    Info {
        /// Run service base URL
        #[arg(long)]
        server: String,

        /// Method whose parameter schema to show
        #[arg(long)]
        method: Option<String>,
    },
}

#[derive(clap::Args)]
struct FrameArgs {
    /// Output image file
    #[arg(short, long, default_value = "artmap.png")]
    output: PathBuf,

    /// Zoom scale to render at
    #[arg(long, default_value = "1.0")]
    zoom: f64,

    /// Frame width in pixels
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value = "800")]
    height: u32,

    /// Thumbnail fetch concurrency
    #[arg(long, default_value = "8")]
    concurrency: usize,

    /// Pixel edge of the depth-0 baked tile
    #[arg(long, default_value = "8192")]
    max_edge: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            server,
            method,
            subset_strategy,
            subset_size,
            config_id,
            images,
            frame,
        } => {
            cmd_run(
                server,
                method,
                subset_strategy,
                subset_size,
                config_id,
                images,
                frame,
            )
            .await
        }
        Commands::Render { input, images, frame } => cmd_render(input, images, frame).await,
        Commands::Info { server, method } => cmd_info(server, method).await,
    }
}

async fn cmd_run(
    server: String,
    method: String,
    subset_strategy: String,
    subset_size: u32,
    config_id: Option<i64>,
    images: Option<String>,
    frame: FrameArgs,
) -> Result<()> {
    let client = ApiClient::new(&server)?;
    let mut request = RunRequest::new(method).with_subset(subset_strategy, subset_size);
    if let Some(id) = config_id {
        request = request.with_config_id(id);
    }

    log::info!("submitting {} run to {}", request.method, server);
    let response = client.run(&request).await?;
    log::info!(
        "config {} completed in {:.2}s ({} points)",
        response.config.config_id,
        response.config.runtime,
        response.points.len()
    );
    load_and_render(response, images, frame).await
}

async fn cmd_render(input: PathBuf, images: Option<String>, frame: FrameArgs) -> Result<()> {
    let payload = std::fs::read_to_string(&input)
        .with_context(|| format!("could not read {}", input.display()))?;
    let response: RunResponse = serde_json::from_str(&payload)
        .with_context(|| format!("{} is not a run response", input.display()))?;
    log::info!(
        "loaded config {} with {} points",
        response.config.config_id,
        response.points.len()
    );
    load_and_render(response, images, frame).await
}

async fn cmd_info(server: String, method: Option<String>) -> Result<()> {
    let client = ApiClient::new(&server)?;

    let methods = client.methods().await?;
    println!("methods: {}", methods.join(", "));

    let strategies = client.subset_strategies().await?;
    println!("subset strategies: {}", strategies.join(", "));

    if let Some(method) = method {
        println!("parameters for {method}:");
        for def in client.param_defs(&method).await? {
            println!("  {} ({:?}) default {:?}", def.name, def.kind, def.default);
        }
    }
    Ok(())
}

async fn load_and_render(
    response: RunResponse,
    images: Option<String>,
    frame: FrameArgs,
) -> Result<()> {
    match images {
        Some(url) => {
            let source = Arc::new(HttpImageSource::new(url)?);
            pipeline_to_png(response, source, frame).await
        }
        None => {
            log::warn!("no --images host given; every thumbnail renders as a placeholder");
            let source = Arc::new(MemorySource::new());
            pipeline_to_png(response, source, frame).await
        }
    }
}

async fn pipeline_to_png<S: ImageSource>(
    response: RunResponse,
    source: Arc<S>,
    frame: FrameArgs,
) -> Result<()> {
    let viewport = Viewport::new(frame.width as f64, frame.height as f64);
    let mut ctx = ViewContext::new(viewport);

    let stream_params = StreamParams {
        concurrency: frame.concurrency,
        ..Default::default()
    };
    let bake_params = BakeParams {
        max_edge: frame.max_edge,
        ..Default::default()
    };

    let points: Vec<Point> = response.points.into_iter().map(Point::from).collect();
    let report = run_pipeline(&mut ctx, points, source, stream_params, &bake_params).await?;
    log::info!(
        "streamed {}/{} thumbnails in {:.2}s ({} failed)",
        report.success,
        report.total,
        report.duration_seconds,
        report.errors.len()
    );

    // Zoom about the frame center from the fitted view.
    let fit = viewport.fit_transform();
    let (cx, cy) = viewport.center();
    ctx.set_transform(fit.zoom_about(cx, cy, frame.zoom / fit.k));

    let mut surface = RasterSurface::new(frame.width, frame.height)?;
    let rendered = ctx.render(&mut surface);
    log::info!(
        "rendered {:?} ({} tiles, {} points) at k={:.2}",
        rendered.lod,
        rendered.tiles_drawn,
        rendered.points_drawn,
        ctx.transform.k
    );

    surface
        .into_image()
        .save(&frame.output)
        .with_context(|| format!("could not write {}", frame.output.display()))?;
    log::info!("wrote {}", frame.output.display());
    println!("{}", ctx.status());
    Ok(())
}
