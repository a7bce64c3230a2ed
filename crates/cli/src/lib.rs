use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use signview_core::{SignatureViewer, ViewerConfig};
use signview_render::{
    PdfDocument, PdfEngine, PdfPage, RasterEngine, RenderOutcome, Rotation, SignatureImage,
    SignatureZone,
};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "signview-cli")]
#[command(about = "Signview CLI")]
pub struct Cli {
    /// Log lifecycle details to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Viewer configuration file (TOML). Defaults to SIGNVIEW_* variables.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
    },
    /// Render one page with its signature overlays to a PNG.
    Render {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// Clockwise rotation in degrees (multiple of 90).
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rotation: i32,
        /// Device pixel ratio of the target display.
        #[arg(long, default_value_t = 1.0)]
        dpr: f32,
        /// JSON file with `zones` and `images` overlays.
        #[arg(long, value_name = "FILE")]
        overlays: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Draw a placement rectangle and print it in page units.
    Place {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// Pointer-down position in screen pixels, as `x,y`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: Point,
        /// Pointer-up position in screen pixels, as `x,y`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: Point,
        #[arg(long)]
        signature_id: u64,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    source: String,
    page_count: u32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width: f32,
    height: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverlayFile {
    zones: Vec<SignatureZone>,
    images: Vec<OverlayImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlayImage {
    page_number: u32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    /// Image file, relative to the overlay file
    path: PathBuf,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Commands::Info { source } => runtime.block_on(run_info(&source)),
        Commands::Render {
            source,
            page,
            scale,
            rotation,
            dpr,
            overlays,
            output,
        } => {
            let rotation = Rotation::from_degrees(rotation)
                .with_context(|| format!("rotation must be a multiple of 90, got {rotation}"))?;
            let overlays = overlays.as_deref().map(load_overlays).transpose()?;
            runtime.block_on(run_render(
                config,
                &source,
                ViewRequest { page, scale, rotation, dpr },
                overlays.unwrap_or_default(),
                &output,
            ))
        }
        Commands::Place {
            source,
            page,
            scale,
            from,
            to,
            signature_id,
        } => runtime.block_on(run_place(config, &source, page, scale, from, to, signature_id)),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => ViewerConfig::from_env().context("invalid SIGNVIEW_* environment configuration"),
    }
}

async fn run_info(source: &Path) -> Result<()> {
    ensure_source_exists(source)?;

    let engine = RasterEngine::new();
    let document = engine
        .load_document(&source.to_string_lossy())
        .await
        .context("failed to open document")?;

    let mut pages = Vec::new();
    for page_number in 1..=document.page_count() {
        let page = document.get_page(page_number).await?;
        let size = page.size();
        pages.push(PageOutput {
            page: page_number,
            width: size.width,
            height: size.height,
        });
    }

    let payload = InfoOutput {
        source: source.display().to_string(),
        page_count: document.page_count(),
        pages,
    };
    document.destroy();

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

struct ViewRequest {
    page: u32,
    scale: f32,
    rotation: Rotation,
    dpr: f32,
}

async fn open_viewer(
    config: ViewerConfig,
    source: &Path,
    view: &ViewRequest,
) -> Result<SignatureViewer<RasterEngine>> {
    ensure_source_exists(source)?;

    if view.page == 0 {
        bail!("--page is 1-based and must be >= 1");
    }

    let mut viewer = SignatureViewer::new(RasterEngine::new(), config, view.dpr);
    viewer.open(source.to_string_lossy());
    viewer.settle().await;

    if let Some(error) = viewer.status().error {
        return Err(error).context("failed to open document");
    }
    if !viewer.go_to_page(view.page) {
        bail!(
            "page {} out of range (document has {} page(s))",
            view.page,
            viewer.page_count()
        );
    }
    viewer.set_scale(view.scale);
    while viewer.view().rotation != view.rotation {
        viewer.rotate_clockwise();
    }

    Ok(viewer)
}

async fn render_page(viewer: &mut SignatureViewer<RasterEngine>) -> Result<()> {
    match viewer.render_current().await {
        Some(RenderOutcome::Rendered { .. }) => Ok(()),
        Some(RenderOutcome::Failed(error)) => Err(error).context("failed to render page"),
        Some(RenderOutcome::Superseded) | None => bail!("render did not complete"),
    }
}

async fn run_render(
    config: ViewerConfig,
    source: &Path,
    view: ViewRequest,
    overlays: (Vec<SignatureZone>, Vec<SignatureImage>),
    output: &Path,
) -> Result<()> {
    let mut viewer = open_viewer(config, source, &view).await?;
    let (zones, images) = overlays;
    viewer.set_overlays(zones, images);
    render_page(&mut viewer).await?;

    let rendered = viewer
        .rendered()
        .context("renderer produced no raster")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    rendered
        .image
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    viewer.close();

    Ok(())
}

async fn run_place(
    config: ViewerConfig,
    source: &Path,
    page: u32,
    scale: f32,
    from: Point,
    to: Point,
    signature_id: u64,
) -> Result<()> {
    let min_size = config.min_selection_px;
    let view = ViewRequest {
        page,
        scale,
        rotation: Rotation::None,
        dpr: 1.0,
    };
    let mut viewer = open_viewer(config, source, &view).await?;
    render_page(&mut viewer).await?;

    let editor = viewer.open_placement_editor(Some(signature_id));
    editor.pointer_down(1, from);
    editor.pointer_move(1, to);
    editor.pointer_up(1, to);

    let Some(placement) = editor.submit() else {
        bail!("selection discarded: width and height must both be at least {min_size}px");
    };

    let json = serde_json::to_string_pretty(&placement)?;
    println!("{json}");
    viewer.close();

    Ok(())
}

fn load_overlays(path: &Path) -> Result<(Vec<SignatureZone>, Vec<SignatureImage>)> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read overlays from {}", path.display()))?;
    let file: OverlayFile = serde_json::from_str(&contents)
        .with_context(|| format!("invalid overlays file {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let images = file
        .images
        .into_iter()
        .map(|overlay| {
            let image_path = base.join(&overlay.path);
            let image = image::open(&image_path)
                .with_context(|| {
                    format!("failed to read signature image {}", image_path.display())
                })?
                .to_rgba8();
            Ok(SignatureImage {
                page_number: overlay.page_number,
                x: overlay.x,
                y: overlay.y,
                width: overlay.width,
                height: overlay.height,
                image_data: Arc::new(image),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((file.zones, images))
}

fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{value}`"))?;
    let x: f64 = x.trim().parse().map_err(|_| format!("invalid x coordinate `{x}`"))?;
    let y: f64 = y.trim().parse().map_err(|_| format!("invalid y coordinate `{y}`"))?;
    Ok(Point::new(x, y))
}

fn ensure_source_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("source does not exist: {}", path.display());
    }

    Ok(())
}
