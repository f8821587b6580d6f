use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use chroma_view::config::{read_config, write_config};
use chroma_view::model::{Model, ModelOptions};
use chroma_view::settings::SettingsConfig;

/// Render a multi-channel image through per-channel filter pipelines.
#[derive(Parser)]
#[command(name = "chroma-view", version)]
struct Cli {
    /// Image to open (PNG/JPEG/GIF/WebP/TIFF, or a JSON array container).
    #[arg(short, long)]
    input: PathBuf,

    /// Saved channel configuration to apply after loading.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the composited PNG.
    #[arg(short, long, default_value = "composite.png")]
    output: PathBuf,

    /// Directory for per-channel response curve PNGs.
    #[arg(long, value_name = "DIR")]
    responses: Option<PathBuf>,

    /// Write the final channel configuration here.
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,

    /// Prefer the GPU backend.
    #[arg(short, long, conflicts_with = "no_gpu")]
    gpu: bool,

    /// Force the CPU backend.
    #[arg(long)]
    no_gpu: bool,

    /// Persist the effective GPU/debug settings as the new defaults.
    #[arg(long)]
    save_settings: bool,

    /// Verbose logging; render failures are reported as errors.
    #[arg(short, long)]
    debug: bool,

    /// Give up waiting for a load or render after this long.
    #[arg(long, value_name = "MS", default_value_t = 60_000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = SettingsConfig::load();
    if cli.gpu {
        settings.use_gpu = true;
    }
    if cli.no_gpu {
        settings.use_gpu = false;
    }
    settings.debug |= cli.debug;

    let default_level = if settings.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    if cli.save_settings {
        settings.save();
        log::info!("Saved settings (use_gpu: {}, debug: {})", settings.use_gpu, settings.debug);
    }

    let timeout = Duration::from_millis(cli.timeout_ms);
    let mut model = Model::new(ModelOptions {
        prefer_gpu: settings.use_gpu,
        debug: settings.debug,
        poll_interval: settings.poll_interval(),
    });

    model.open(&cli.input);
    if !model.wait_for_io(timeout) {
        bail!("Timed out loading {}", cli.input.display());
    }
    if let Some(error) = model.last_io_error() {
        bail!("Failed to load image: {error}");
    }

    if let Some(path) = &cli.config {
        let doc = read_config(path)?;
        let report = model
            .load(&doc)
            .with_context(|| format!("Failed to apply config {}", path.display()))?;
        log::info!(
            "Applied settings to {} channel(s) ({} ignored, {} unrecognized entries)",
            report.applied,
            report.truncated,
            report.skipped_keys.len()
        );
    }

    if !model.wait_for_render(timeout) {
        bail!("Timed out waiting for render");
    }
    let Some(frame) = model.last_render() else {
        bail!("Rendering produced no frame");
    };

    frame
        .composited
        .save(&cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    log::info!("Wrote {}", cli.output.display());

    if let Some(dir) = &cli.responses {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (i, response) in frame.response_images.iter().enumerate() {
            let path = dir.join(format!("response_{i}.png"));
            response
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        log::info!(
            "Wrote {} response image(s) to {}",
            frame.response_images.len(),
            dir.display()
        );
    }

    if let Some(path) = &cli.save_config {
        write_config(path, &model.save())?;
    }

    Ok(())
}
