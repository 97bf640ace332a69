// Interactive threshold adjustment example
//
// Puts the BBTK into its front-panel threshold adjustment mode and waits
// until the operator leaves it, then prints the resulting thresholds.

use bbtk_rs::{BbtkConnector, CancelToken, PollLimit, SessionConfig};
use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "adjust_thresholds")]
#[command(version = "1.0")]
#[command(about = "Adjust the thresholds of a Black Box ToolKit v3 from its front panel")]
struct Args {
    /// Serial port of the BBTK (falls back to BBTK_PORT, then autodetection)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115_200, help = "Baud rate in bps")]
    baud: u32,

    #[arg(short, long, default_value_t = 600, help = "Give up after this many seconds")]
    timeout: u64,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let deadline = Duration::from_secs(args.timeout);
    let config = SessionConfig::default()
        .baud_rate(args.baud)
        .adjust_limit(PollLimit::new(u32::MAX, deadline));
    let mut bbtk = BbtkConnector::connect(args.port.as_deref(), config)?;

    println!("Connected. Current thresholds: {}", bbtk.get_thresholds()?);

    println!("The BBTK is now in threshold setting mode. Press the exit button on the box when done.");
    bbtk.adjust_thresholds(&CancelToken::new())?;

    println!("Thresholds now: {}", bbtk.get_thresholds()?);
    bbtk.disconnect();

    Ok(())
}
