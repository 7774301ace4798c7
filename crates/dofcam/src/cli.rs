use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{ColorSpaceMode, GpuPowerPreference};

#[derive(Parser, Debug)]
#[command(
    name = "dofcam",
    author,
    version,
    about = "Light field depth-of-field camera preview",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Light field config file; defaults to `dofcam.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sub-cameras per side of the square array.
    #[arg(long, value_name = "N")]
    pub views: Option<u32>,

    /// Edge length of the square tile texture in pixels.
    #[arg(long, value_name = "PX")]
    pub resolution: Option<u32>,

    /// Lens aperture diameter in world units.
    #[arg(long, value_name = "A")]
    pub aperture: Option<f32>,

    /// Distance from the lens to the plane in focus.
    #[arg(long, value_name = "D")]
    pub focal_distance: Option<f32>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Optional FPS cap (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Output color space handling: `auto`, `gamma`, or `linear`.
    #[arg(
        long,
        value_name = "MODE",
        value_parser = parse_color_space,
        default_value = "auto"
    )]
    pub color_space: ColorSpaceMode,

    /// GPU adapter preference: `low` or `high`.
    #[arg(
        long,
        value_name = "POWER",
        value_parser = parse_power,
        default_value = "high"
    )]
    pub power: GpuPowerPreference,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and validate light field config files.
    Config(ConfigCommand),
    /// Box-filter a tiled PNG into one image on the CPU.
    Average(AverageArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config directory and default config file.
    Where,
    /// Print the effective configuration, command-line overrides included.
    Print {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Validate a config file.
    Check {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
pub struct AverageArgs {
    /// Tiles per side in the input image.
    #[arg(long, value_name = "N")]
    pub views: u32,

    /// Output size; defaults to one tile.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("size '{trimmed}' must be non-zero"));
    }
    Ok((width, height))
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ColorSpaceMode::Auto),
        "gamma" | "srgb-off" => Ok(ColorSpaceMode::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceMode::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected auto, gamma, or linear"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown power preference '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_size_accepts_either_separator_case() {
        assert_eq!(parse_surface_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_surface_size(" 640X480 "), Ok((640, 480)));
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("axb").is_err());
    }

    #[test]
    fn color_space_aliases() {
        assert_eq!(parse_color_space("AUTO"), Ok(ColorSpaceMode::Auto));
        assert_eq!(parse_color_space("srgb"), Ok(ColorSpaceMode::Linear));
        assert_eq!(parse_color_space("gamma"), Ok(ColorSpaceMode::Gamma));
        assert!(parse_color_space("").is_err());
        assert!(parse_color_space("hdr").is_err());
    }

    #[test]
    fn power_preference_parses() {
        assert_eq!(parse_power("low"), Ok(GpuPowerPreference::Low));
        assert_eq!(parse_power("High"), Ok(GpuPowerPreference::High));
        assert!(parse_power("medium").is_err());
    }

    #[test]
    fn overrides_parse_before_subcommands() {
        let cli = Cli::try_parse_from([
            "dofcam",
            "--views",
            "6",
            "--focal-distance",
            "2.5",
            "config",
            "print",
        ])
        .unwrap();
        assert_eq!(cli.run.views, Some(6));
        assert_eq!(cli.run.focal_distance, Some(2.5));
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Print { file: None }
            }))
        ));
    }

    #[test]
    fn average_requires_views() {
        assert!(Cli::try_parse_from(["dofcam", "average", "in.png", "out.png"]).is_err());
        let cli =
            Cli::try_parse_from(["dofcam", "average", "--views", "3", "in.png", "out.png"]).unwrap();
        match cli.command {
            Some(Command::Average(args)) => {
                assert_eq!(args.views, 3);
                assert_eq!(args.size, None);
                assert_eq!(args.output, PathBuf::from("out.png"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
