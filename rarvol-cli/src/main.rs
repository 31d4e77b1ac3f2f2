use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rarvol_core::encode::{Encoder, EncoderConfig};
use rarvol_core::manifest::Manifest;
use rarvol_core::planner::VolumePlan;
use rarvol_core::repair::{check_volume, repair_volume};
use rarvol_core::timestamp::Timestamp;
use rarvol_core::verify::{verify, VolumeStatus};
use rarvol_core::volume::VolumeNaming;

#[derive(Parser)]
#[command(name = "rarvol", version, about = "Stored RAR3 multi-volume writer with recovery records")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Split a file into stored volumes plus an SFV manifest
    Create {
        #[arg(long)]
        file: PathBuf,
        /// Target volume size; K/M/G suffixes are powers of 10
        #[arg(long, default_value = "15M", value_parser = parse_size)]
        size: u64,
        /// Modification time override, YYYY-MM-DDTHH:MM:SS[.fffffff]
        #[arg(long, value_parser = parse_time)]
        time: Option<Timestamp>,
        /// Name stored inside the volumes (default: the file's name)
        #[arg(long)]
        name: Option<String>,
        /// Base name of the output files (default: the file's stem)
        #[arg(long)]
        base: Option<String>,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// Print the plan without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Print the plan as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Recompute volume CRCs against an SFV manifest
    Verify { sfv: PathBuf },
    /// Report damaged sectors of a volume using its recovery record
    Check {
        volume: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rebuild damaged sectors of a volume in place
    Repair { volume: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Create { file, size, time, name, base, output_dir, dry_run, json } => {
            let cfg = EncoderConfig {
                data_file: file,
                volume_size: size,
                naming: VolumeNaming::Legacy,
                stored_name: name,
                base,
                output_dir,
                mtime: time,
                dry_run,
            };
            create(&cfg, json)?
        }
        Cmd::Verify { sfv } => verify_cmd(&sfv)?,
        Cmd::Check { volume, json } => check(&volume, json)?,
        Cmd::Repair { volume } => repair(&volume)?,
    }
    Ok(())
}

fn parse_size(s: &str) -> Result<u64> {
    let t = s.trim().to_uppercase();
    let (num, mul) = match t.chars().last() {
        Some('K') => (&t[..t.len() - 1], 1_000),
        Some('M') => (&t[..t.len() - 1], 1_000_000),
        Some('G') => (&t[..t.len() - 1], 1_000_000_000),
        _ => (&t[..], 1),
    };
    let v: u64 = num.trim().parse().map_err(|_| anyhow!("bad size {s}"))?;
    v.checked_mul(mul).ok_or_else(|| anyhow!("size {s} is too large"))
}

fn parse_time(s: &str) -> Result<Timestamp> {
    let t = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("bad time {s}, expected YYYY-MM-DDTHH:MM:SS[.fffffff]"))?;
    Ok(Timestamp::new(t)?)
}

fn print_plan(plan: &VolumePlan, manifest: Option<&Manifest>) {
    for v in &plan.volumes {
        match manifest.and_then(|m| m.get(&v.name)) {
            Some(crc) => println!("{}\t{}\t{crc:08X}", v.name, v.total_size),
            None => println!("{}\t{}", v.name, v.total_size),
        }
    }
    println!("{}\t{}", plan.manifest_name, plan.manifest_size);
    println!("volumes={}", plan.volumes.len());
}

fn create(cfg: &EncoderConfig, json: bool) -> Result<()> {
    let report = Encoder::encode(cfg)
        .with_context(|| format!("create volumes from {}", cfg.data_file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.plan)?);
    } else {
        print_plan(&report.plan, report.manifest.as_ref());
    }
    Ok(())
}

fn verify_cmd(sfv: &std::path::Path) -> Result<()> {
    let report = verify(sfv).with_context(|| format!("verify {}", sfv.display()))?;
    for v in &report.volumes {
        match v.status {
            VolumeStatus::Ok => println!("OK       {}", v.name),
            VolumeStatus::Mismatch { actual } => {
                println!("BAD      {} (expected {:08x}, got {actual:08x})", v.name, v.expected)
            }
            VolumeStatus::Missing => println!("MISSING  {}", v.name),
        }
    }
    println!("ok={} bad={} missing={}", report.ok(), report.bad(), report.missing());
    if !report.all_ok() {
        return Err(anyhow!("{} of {} volumes failed", report.volumes.len() - report.ok(), report.volumes.len()));
    }
    Ok(())
}

fn check(volume: &std::path::Path, json: bool) -> Result<()> {
    let report = check_volume(volume).with_context(|| format!("check {}", volume.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "sectors={} parity={} record={} damaged={} unrepairable={}",
            report.protected_sectors,
            report.parity_sectors,
            if report.record_intact { "ok" } else { "BAD" },
            report.damaged.len(),
            report.unrepairable.len()
        );
        for i in &report.damaged {
            println!("damaged sector {i}");
        }
    }
    if !report.is_clean() {
        return Err(anyhow!("{} is damaged", volume.display()));
    }
    Ok(())
}

fn repair(volume: &std::path::Path) -> Result<()> {
    let report = repair_volume(volume).with_context(|| format!("repair {}", volume.display()))?;
    println!("repaired={} unrepairable={}", report.repaired.len(), report.unrepairable.len());
    if !report.unrepairable.is_empty() {
        return Err(anyhow!("sectors {:?} could not be rebuilt", report.unrepairable));
    }
    Ok(())
}
