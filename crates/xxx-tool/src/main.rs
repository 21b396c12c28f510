//! xxxtool - extract and patch audio inside XXX containers

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xxx_sound::audio::mpeg;
use xxx_sound::formats::xxx;
use xxx_sound::{batch, extract, scan, BatchReport, ByteCursor, MagicPolicy, ToolConfig};

#[derive(Parser)]
#[command(name = "xxxtool")]
#[command(about = "Extract and patch FSB4 audio inside XXX containers")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail on a bad container magic instead of warning
    #[arg(long, global = true)]
    strict: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a container and extract every bank and sample
    Extract {
        /// Container file, or a folder of containers
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Extract every sample of a bare .fsb file
    ExtractFsb {
        input: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// List located banks and their samples
    Info {
        input: PathBuf,

        /// Scan the whole file instead of a container's data region
        #[arg(long)]
        raw: bool,
    },

    /// Replace one sample by name
    Patch {
        container: PathBuf,
        sample: String,
        /// Replacement payload
        data: PathBuf,
    },

    /// Replace one sample by bank and sample index
    PatchIndex {
        container: PathBuf,
        bank: usize,
        sample: usize,
        data: PathBuf,
    },

    /// Replace every sample that has a matching file in a folder
    PatchAll { container: PathBuf, folder: PathBuf },

    /// Copy metadata and payloads from a donor bank, matched by sample name
    Donor {
        container: PathBuf,
        donor: PathBuf,

        /// Only patch this bank (default: all)
        #[arg(short, long)]
        bank: Option<usize>,
    },

    /// Overwrite a whole bank with a new .fsb image
    ReplaceBank {
        container: PathBuf,
        bank: usize,
        fsb: PathBuf,
    },

    /// Concatenate a header and a data blob into a container
    Pack {
        header: PathBuf,
        data: PathBuf,
        output: PathBuf,
    },

    /// Raw overwrite at an offset, with no validation
    Inject {
        target: PathBuf,
        asset: PathBuf,
        /// Offset, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_offset)]
        offset: u64,
    },

    /// Extract raw MPEG streams found anywhere in a file
    Mpeg {
        input: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn parse_offset(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset {s:?}: {e}"))
}

fn load_config(cli: &Cli) -> Result<ToolConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ToolConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => ToolConfig::default(),
    };
    if cli.strict {
        cfg.magic_policy = MagicPolicy::Strict;
    }
    Ok(cfg)
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_batch(report: &BatchReport) -> Result<()> {
    for outcome in &report.applied {
        println!("  patched {} at 0x{:X} ({} bytes, {} padding)", outcome.name, outcome.offset, outcome.written, outcome.padded);
    }
    for item in &report.skipped {
        println!("  skipped {item}");
    }
    for item in &report.failed {
        println!("  FAILED  {item}");
    }
    println!("{}", report.summary());
    if !report.is_clean() {
        bail!("{} item(s) failed", report.failed.len());
    }
    Ok(())
}

fn list_banks(path: &Path, raw: bool, cfg: &ToolConfig) -> Result<()> {
    let mut cursor = ByteCursor::open(path).with_context(|| format!("opening {}", path.display()))?;
    let report = if raw {
        scan::scan(&mut cursor, cfg)?
    } else {
        let (layout, report) = scan::scan_container(&mut cursor, cfg)?;
        println!(
            "Container: header 0x0..0x{:X}, data 0x{:X}..0x{:X}{}",
            layout.header.end,
            layout.data.start,
            layout.data.end,
            if layout.info.magic_valid { "" } else { " (bad magic)" }
        );
        report
    };

    for record in &report.banks {
        println!(
            "Bank {} [{:?}] at 0x{:X}: {} bytes declared, {} present{}",
            record.index,
            record.version,
            record.start,
            record.declared_size,
            record.present(),
            if record.is_truncated() { " (truncated)" } else { "" }
        );
        let Some(bank) = &record.bank else { continue };
        for issue in &bank.issues {
            println!("  ! {issue}");
        }
        for (sample, range) in extract::sample_ranges(bank) {
            println!(
                "  [{}] {} | {} | {} ch | {} Hz | 0x{:X}..0x{:X} | {} bytes",
                sample.index,
                sample.name,
                sample.mode.format_name(),
                sample.channels,
                sample.frequency,
                range.start,
                range.end,
                sample.data_size
            );
        }
    }
    for skipped in &report.skipped {
        println!("Skipped signature at 0x{:X}: {}", skipped.offset, skipped.reason);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;

    match cli.command {
        Commands::Extract { input, output } => {
            if input.is_dir() {
                let results = extract::extract_directory(&input, &output, &cfg)?;
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                for (file, result) in &results {
                    match result {
                        Ok(report) => println!("{} -> {}", file.display(), report.dir.display()),
                        Err(e) => println!("{}: FAILED {e}", file.display()),
                    }
                }
                println!("{} of {} containers extracted", results.len() - failed, results.len());
                if failed > 0 {
                    bail!("{failed} container(s) failed");
                }
            } else {
                let report = extract::extract_container(&input, &output, &cfg)
                    .with_context(|| format!("extracting {}", input.display()))?;
                for failure in &report.failures {
                    println!("  FAILED  {failure}");
                }
                println!(
                    "Extracted {} banks, {} samples to {}, {} failed",
                    report.manifest.banks.len(),
                    report.sample_count(),
                    report.dir.display(),
                    report.failures.len()
                );
                if !report.failures.is_empty() {
                    bail!("{} sample(s) failed", report.failures.len());
                }
            }
        }
        Commands::ExtractFsb { input, output } => {
            let report = extract::extract_fsb(&input, &output, &cfg).with_context(|| format!("extracting {}", input.display()))?;
            println!("Extracted {} samples to {}", report.sample_count(), report.dir.display());
        }
        Commands::Info { input, raw } => list_banks(&input, raw, &cfg)?,
        Commands::Patch { container, sample, data } => {
            let payload = read_payload(&data)?;
            let outcome = batch::patch_container_sample(&container, &sample, &payload, &cfg)?;
            println!("Patched {} at 0x{:X}", outcome.name, outcome.offset);
        }
        Commands::PatchIndex { container, bank, sample, data } => {
            let payload = read_payload(&data)?;
            let outcome = batch::patch_container_sample_by_index(&container, bank, sample, &payload, &cfg)?;
            println!("Patched {} at 0x{:X}", outcome.name, outcome.offset);
        }
        Commands::PatchAll { container, folder } => {
            let report = batch::patch_all(&container, &folder, &cfg)?;
            print_batch(&report)?;
        }
        Commands::Donor { container, donor, bank } => {
            let report = batch::patch_container_from_donor(&container, &donor, bank, &cfg)?;
            print_batch(&report)?;
        }
        Commands::ReplaceBank { container, bank, fsb } => {
            let outcome = batch::replace_container_bank(&container, bank, &fsb, &cfg)?;
            println!("Replaced bank {} at 0x{:X} ({} bytes, {} padding)", bank, outcome.offset, outcome.written, outcome.padded);
        }
        Commands::Pack { header, data, output } => {
            let written = xxx::pack(&header, &data, &output)?;
            println!("Packed {} ({} bytes)", output.display(), written);
        }
        Commands::Inject { target, asset, offset } => {
            warn!("Raw injection performs no size or structure checks");
            let written = xxx::inject_raw(&target, &asset, offset)?;
            println!("Injected {} bytes at 0x{:X}", written, offset);
        }
        Commands::Mpeg { input, output } => {
            let result = mpeg::extract_streams(&input, &output, &cfg)?;
            println!("Extracted {} MPEG streams to {}", result.streams.len(), result.dir.display());
        }
    }
    Ok(())
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "xxxtool=debug,xxx_sound=debug"
    } else {
        "xxxtool=info,xxx_sound=info"
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose))))
        .init();

    info!("xxxtool {}", env!("CARGO_PKG_VERSION"));
    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse_as_hex_or_decimal() {
        assert_eq!(parse_offset("0x1F"), Ok(31));
        assert_eq!(parse_offset("0X10"), Ok(16));
        assert_eq!(parse_offset("4096"), Ok(4096));
        assert!(parse_offset("0xZZ").is_err());
    }

    #[test]
    fn default_filter_names_this_binary() {
        let own_target = format!("{}=", env!("CARGO_CRATE_NAME"));
        assert!(default_filter(false).starts_with(&own_target));
        assert!(default_filter(true).starts_with(&own_target));
        assert!(default_filter(true).contains("xxx_sound=debug"));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["xxxtool", "info", "a.xxx", "--strict", "-v"]).unwrap();
        assert!(cli.strict);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Info { raw: false, .. }));
    }
}
