// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use capture_studio::dbus::ServiceInterface;
use capture_studio::error_handling::{report_success, set_desktop_mode};
use capture_studio::export::{self, ExportSink, PngFileSink};
use capture_studio::notifications::init_notification_manager;
use capture_studio::screenshot::{CaptureRegion, CaptureRequest, ScreenshotManager};
use capture_studio::settings::{CaptureSettings, SettingsManager};
use capture_studio::store::{self, keys, ConfigStore, MemoryStore, StateStore, StateStoreExt};
use capture_studio::{report_error, report_warning, Background, Editor, EditorOp};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Open the written file with the default viewer
    #[clap(long, global = true)]
    open: bool,
    /// Send a notification when the file is written
    #[clap(long,
        global = true,
        default_missing_value("true"),
        default_value("true"),
        num_args(0..=1),
        require_equals(true),
        action = ArgAction::Set)]
    notify: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture the visible screen, or a region of it
    Capture {
        /// Region as x,y,width,height in logical pixels
        #[clap(long, value_parser = parse_region)]
        region: Option<(f64, f64, f64, f64)>,
        /// Device pixel ratio of the region coordinates
        #[clap(long, default_value_t = 1.0)]
        scale: f64,
        /// The directory to save the capture to
        #[clap(short, long)]
        save_dir: Option<PathBuf>,
    },
    /// Replay a JSON script of editor operations on an image and export it
    Annotate {
        image: PathBuf,
        script: PathBuf,
        /// The directory to save the export to
        #[clap(short, long)]
        save_dir: Option<PathBuf>,
    },
    /// Run the D-Bus service
    Service,
}

fn parse_region(value: &str) -> Result<(f64, f64, f64, f64), String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|err| format!("`{part}`: {err}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, width, height] if *width > 0.0 && *height > 0.0 => Ok((*x, *y, *width, *height)),
        [_, _, _, _] => Err("width and height must be positive".to_string()),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

fn load_settings() -> CaptureSettings {
    match SettingsManager::new() {
        Ok(manager) => manager.settings,
        Err(err) => {
            warn!(error = %err, "settings unavailable, using defaults");
            CaptureSettings::default()
        }
    }
}

fn state_store() -> Arc<dyn StateStore> {
    match ConfigStore::new() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(error = %err, "persistent state unavailable, keeping it in memory");
            Arc::new(MemoryStore::new())
        }
    }
}

fn finish(args: &Args, path: Option<PathBuf>, summary: &str) {
    let Some(path) = path else {
        return;
    };
    println!("{}", path.display());
    if args.notify {
        report_success(summary, &path.to_string_lossy());
    }
    if args.open {
        if let Err(err) = open::that(&path) {
            report_warning!("Open", &format!("Could not open {}: {err}", path.display()));
        }
    }
}

async fn capture(
    args: &Args,
    region: Option<(f64, f64, f64, f64)>,
    scale: f64,
    save_dir: Option<PathBuf>,
) -> Result<(), String> {
    let settings = load_settings();
    let request = region.map_or_else(CaptureRequest::visible, |(x, y, width, height)| {
        CaptureRequest::region(CaptureRegion {
            x,
            y,
            width,
            height,
            scale,
        })
    });

    let shot = ScreenshotManager::new()
        .capture(&request)
        .await
        .and_then(|shot| shot.non_empty())
        .map_err(|err| {
            report_error!("Capture", &err.user_facing());
            err.to_string()
        })?;

    if let Err(err) = state_store().set(keys::CAPTURED_IMAGE, &store::encode_data_url(&shot.image_data)) {
        warn!(error = %err, "could not hand the capture to the studio");
    }

    let sink = PngFileSink::new(save_dir.or(settings.save_directory));
    let path = sink
        .write(&shot.image_data, &export::export_file_stem(chrono::Local::now()))
        .map_err(|err| err.to_string())?;
    finish(args, path, "Screenshot saved to:");
    Ok(())
}

fn annotate(
    args: &Args,
    image: &Path,
    script: &Path,
    save_dir: Option<PathBuf>,
) -> Result<(), String> {
    let settings = load_settings();
    let raster = image::open(image)
        .map_err(|err| format!("{}: {err}", image.display()))?
        .to_rgba8();
    let script = fs::read_to_string(script).map_err(|err| format!("{}: {err}", script.display()))?;
    let ops: Vec<EditorOp> = serde_json::from_str(&script).map_err(|err| format!("script: {err}"))?;

    let mut editor = Editor::new(&settings);
    editor.load_image(raster).map_err(|err| err.to_string())?;
    for (index, op) in ops.iter().enumerate() {
        editor
            .apply(op)
            .map_err(|err| format!("script step {index}: {err}"))?;
    }
    info!(
        objects = editor.scene().objects.len(),
        entries = editor.history().len(),
        "replayed script"
    );

    let sink = PngFileSink::new(save_dir.or_else(|| settings.save_directory.clone()));
    let path = export::export(&editor, &sink, settings.export_scale).map_err(|err| err.to_string())?;
    finish(args, path, "Annotated capture saved to:");
    Ok(())
}

async fn service() -> Result<(), String> {
    set_desktop_mode(true);
    init_notification_manager().await;

    let settings = load_settings();
    let manager = ScreenshotManager::new();
    // No page driver on the desktop: startFullPageCapture reports NoPageContext
    let background = Background::new(Arc::new(manager.clone()), state_store());
    info!(
        scroll_settle_ms = settings.scroll_settle_ms,
        history_capacity = settings.history_capacity,
        "starting service"
    );

    let service = ServiceInterface::new(manager, Arc::new(background))
        .await
        .map_err(|err| format!("failed to start D-Bus service: {err}"))?;
    service.run().await.map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(
        version = capture_studio::VERSION,
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "capture-studio"
    );
    match &args.command {
        Commands::Capture {
            region,
            scale,
            save_dir,
        } => capture(&args, *region, *scale, save_dir.clone()).await,
        Commands::Annotate {
            image,
            script,
            save_dir,
        } => annotate(&args, image, script, save_dir.clone()),
        Commands::Service => service().await,
    }
}
