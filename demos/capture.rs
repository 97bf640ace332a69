// Event capture example
//
// Configures a BBTK with default sensor settings, records a digital capture
// and saves the raw stream, the decoded samples and the extracted events.

use bbtk_rs::{
    decode_capture, extract_events, write_events_csv, write_samples_csv, BbtkConnector,
    CancelToken, SessionConfig, SmoothingMask, Thresholds,
};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "capture")]
#[command(version = "1.0")]
#[command(about = "Capture events with a Black Box ToolKit v3")]
struct Args {
    /// Serial port of the BBTK (falls back to BBTK_PORT, then autodetection)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115_200, help = "Baud rate in bps")]
    baud: u32,

    #[arg(short, long, default_value_t = 30, help = "Duration of the capture in seconds")]
    duration: u32,

    #[arg(short, long, default_value = "bbtk-capture.dat", help = "Base name of the output files")]
    output: PathBuf,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

/// `name-001.ext`, `name-002.ext`, ... whichever does not exist yet.
fn next_free_name(base: &Path) -> PathBuf {
    let stem = base
        .file_stem()
        .map_or_else(|| "bbtk-capture".into(), |s| s.to_string_lossy().to_string());
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|i| base.with_file_name(format!("{stem}-{i:03}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| base.to_path_buf())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{stem}{suffix}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let config = SessionConfig::default()
        .baud_rate(args.baud)
        .verbose(true);
    let mut bbtk = BbtkConnector::connect(args.port.as_deref(), config)?;
    bbtk.reset_serial_buffers()?;

    if bbtk.is_alive()? {
        println!("BBTK is alive");
    } else {
        println!("BBTK not responding to ECHO");
    }

    let mask = SmoothingMask::default();
    println!("Setting smoothing mask to {mask}");
    bbtk.set_smoothing(&mask)?;

    let thresholds = Thresholds::default();
    println!("Setting thresholds to {thresholds}");
    bbtk.set_thresholds(&thresholds)?;

    let cancel = CancelToken::new();
    print!("Clearing timing data... ");
    std::io::stdout().flush()?;
    bbtk.clear_timing_data(&cancel)?;
    println!("ok");

    println!("Capturing events for {} s...", args.duration);
    let raw = bbtk.capture_events(args.duration, &cancel)?;
    bbtk.disconnect();

    let raw_path = next_free_name(&args.output);
    std::fs::write(&raw_path, &raw)?;
    println!("Raw data saved to {}", raw_path.display());

    let samples = decode_capture(&raw)?;
    let samples_path = sibling(&raw_path, "-dscevents.csv");
    write_samples_csv(&samples, BufWriter::new(File::create(&samples_path)?))?;
    println!("{} samples saved to {}", samples.len(), samples_path.display());

    let events = extract_events(&samples)?;
    let events_path = sibling(&raw_path, "-events.csv");
    write_events_csv(&events, BufWriter::new(File::create(&events_path)?))?;
    println!("{} events saved to {}", events.len(), events_path.display());

    Ok(())
}
