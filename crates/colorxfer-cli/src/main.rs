//! colorxfer - statistical color transfer between two images
//!
//! Converts both images to CIE LAB on a compute device and remaps the
//! source so its channel statistics match the target's.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colorxfer_compute::{DeviceClass, ResourceManager, WgpuProvider};
use colorxfer_transfer::{parse_resolution, transfer_files, DeviationCenter, TransferConfig};
use tracing::info;

const USAGE: &str = "Error! Must specify at least 2 arguments. \n\
For example, \"colorxfer imageA.png imageB.png\"";

#[derive(Parser)]
#[command(name = "colorxfer")]
#[command(author, version, about = "Statistical color transfer in CIE LAB on a compute device")]
#[command(long_about = "
Remaps the colors of SOURCE so that each LAB channel has the mean and
standard deviation of TARGET. Writes outputSourceLAB.png,
outputTargetLAB.png and output.png to the output directory.

Examples:
  colorxfer imageA.png imageB.png
  colorxfer --device cpu imageA.png imageB.jpg -o out/
  colorxfer --vendor intel --size 1024x1024 a.png b.png
  colorxfer --list-devices
")]
struct Cli {
    /// Source and target images
    inputs: Vec<PathBuf>,

    /// Device class to run on: cpu or gpu (default gpu, env COLORXFER_DEVICE)
    #[arg(long)]
    device: Option<DeviceClass>,

    /// Vendor substring to try, in order (repeatable; replaces the built-in lists)
    #[arg(long = "vendor", value_name = "SUBSTR")]
    vendors: Vec<String>,

    /// WGSL program with the rgb_to_lab and color_transfer kernels
    #[arg(long, value_name = "PATH")]
    program: Option<PathBuf>,

    /// Directory for the output images
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Working resolution WxH (default: each image's own size)
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Measure the target deviation about the source mean
    #[arg(long)]
    legacy_target_deviation: bool,

    /// Print discovered platforms and devices, then exit
    #[arg(long)]
    list_devices: bool,

    /// Number of host threads for statistics (0 = auto)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    parse_resolution(s).ok_or_else(|| format!("expected WxH with non-zero sides, got '{s}'"))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn,colorxfer=info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> TransferConfig {
    let mut config = TransferConfig::from_env();
    if let Some(class) = cli.device {
        config = config.with_preference(class);
    }
    if !cli.vendors.is_empty() {
        config = config.with_vendors(&cli.vendors);
    }
    if let Some(path) = &cli.program {
        config = config.with_program(path);
    }
    if let Some(dir) = &cli.output_dir {
        config = config.with_output_dir(dir);
    }
    if cli.legacy_target_deviation {
        config = config.with_deviation_center(DeviationCenter::SourceMean);
    }
    config.with_working_resolution(cli.size)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.list_devices && cli.inputs.len() < 2 {
        println!("{USAGE}");
        return Ok(());
    }

    init_tracing(cli.verbose);

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let mut rm = ResourceManager::new(WgpuProvider::new());
    let discovery = rm.discover();

    if cli.list_devices {
        print!("{}", discovery.describe());
        return Ok(());
    }

    let config = build_config(&cli);
    let (source, target) = (&cli.inputs[0], &cli.inputs[1]);
    if cli.inputs.len() > 2 {
        info!(ignored = cli.inputs.len() - 2, "Extra arguments ignored");
    }

    let paths = transfer_files(&mut rm, config, source, target).with_context(|| {
        format!("Color transfer from {} to {} failed", source.display(), target.display())
    })?;

    println!("{}", paths.source_lab.display());
    println!("{}", paths.target_lab.display());
    println!("{}", paths.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_reach_config() {
        let cli = Cli::parse_from([
            "colorxfer",
            "--device",
            "cpu",
            "--vendor",
            "llvmpipe",
            "--vendor",
            "intel",
            "--size",
            "64x32",
            "--legacy-target-deviation",
            "-o",
            "out",
            "a.png",
            "b.png",
        ]);
        let config = build_config(&cli);
        assert_eq!(config.preference, DeviceClass::Cpu);
        assert_eq!(config.plan.contexts, vec!["llvmpipe", "intel"]);
        assert!(!config.plan.any_fallback);
        assert_eq!(config.working_resolution, Some((64, 32)));
        assert_eq!(config.deviation_center, DeviationCenter::SourceMean);
        assert_eq!(config.output_path(), PathBuf::from("out").join("output.png"));
    }

    #[test]
    fn bad_size_is_rejected() {
        assert!(Cli::try_parse_from(["colorxfer", "--size", "0x8", "a", "b"]).is_err());
        assert!(Cli::try_parse_from(["colorxfer", "--device", "fpga", "a", "b"]).is_err());
    }

    #[test]
    fn legacy_deviation_help_names_source_mean() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_long() == Some("legacy-target-deviation"))
            .unwrap();
        let help = arg.get_help().unwrap().to_string();
        assert!(help.contains("target deviation about the source mean"), "{help}");
    }
}
