use std::path::Path;

use anyhow::{bail, Context, Result};
use camarray::{average_tiles, averaged_extent};
use renderer::Renderer;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{apply_overrides, load_config, renderer_config};
use crate::cli::{AverageArgs, Cli, Command, ConfigAction, RunArgs};
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved dofcam paths");

    match cli.command {
        Some(Command::Config(command)) => run_config(command.action, &cli.run, &paths),
        Some(Command::Average(args)) => run_average(&args),
        None => run_preview(&cli.run, &paths),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_preview(args: &RunArgs, paths: &AppPaths) -> Result<()> {
    let loaded = load_config(args.config.as_deref(), paths)?;
    let light_field = apply_overrides(&loaded.config, args)?;
    tracing::info!(
        views = light_field.array.views,
        resolution = light_field.array.resolution,
        aperture = light_field.array.aperture,
        focal_distance = light_field.array.focal_distance,
        "bootstrapping dofcam preview"
    );
    let mut renderer = Renderer::new(renderer_config(args, light_field));
    renderer.run()
}

fn run_config(action: ConfigAction, args: &RunArgs, paths: &AppPaths) -> Result<()> {
    match action {
        ConfigAction::Where => {
            println!("config dir:  {}", paths.config_dir().display());
            println!("config file: {}", paths.config_file().display());
            Ok(())
        }
        ConfigAction::Print { file } => {
            let explicit = file.as_deref().or(args.config.as_deref());
            let loaded = load_config(explicit, paths)?;
            let config = apply_overrides(&loaded.config, args)?;
            let rendered = config
                .to_toml_string()
                .context("failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
        ConfigAction::Check { file } => {
            let explicit = file.as_deref().or(args.config.as_deref());
            let Some(path) = explicit
                .map(Path::to_path_buf)
                .or_else(|| Some(paths.config_file()).filter(|path| path.is_file()))
            else {
                bail!(
                    "no config file to check; pass FILE or create {}",
                    paths.config_file().display()
                );
            };
            let loaded = load_config(Some(&path), paths)?;
            let array = &loaded.config.array;
            println!(
                "ok: {} ({}x{} views, {}px, aperture {}, focal distance {})",
                path.display(),
                array.views,
                array.views,
                array.resolution,
                array.aperture,
                array.focal_distance,
            );
            Ok(())
        }
    }
}

fn run_average(args: &AverageArgs) -> Result<()> {
    let tiles = image::open(&args.input)
        .with_context(|| format!("failed to read tiled image {}", args.input.display()))?
        .to_rgba32f();
    let (width, height) = args
        .size
        .unwrap_or_else(|| averaged_extent(&tiles, args.views));
    let averaged = average_tiles(&tiles, args.views, width, height)
        .with_context(|| format!("failed to average {}", args.input.display()))?;
    image::DynamicImage::ImageRgba32F(averaged)
        .to_rgba8()
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    tracing::info!(
        input = %args.input.display(),
        output = %args.output.display(),
        views = args.views,
        width,
        height,
        "averaged tiled image"
    );
    Ok(())
}
