// Threshold setting example
//
// Reads the current activation thresholds, writes new ones and reads them
// back to confirm.

use bbtk_rs::{BbtkConnector, SessionConfig, Thresholds};
use clap::Parser;

#[derive(Parser)]
#[command(name = "set_thresholds")]
#[command(version = "1.0")]
#[command(about = "Set the activation thresholds of a Black Box ToolKit v3")]
struct Args {
    /// 8 comma separated values between 0 and 127, in the order
    /// Mic1,Mic2,Sounder1,Sounder2,Opto1,Opto2,Opto3,Opto4 (e.g. "63,63,32,32,100,100,100,100")
    thresholds: Thresholds,

    /// Serial port of the BBTK (falls back to BBTK_PORT, then autodetection)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115_200, help = "Baud rate in bps")]
    baud: u32,

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

    args.thresholds.validate()?;
    println!("Will set thresholds to: {}", args.thresholds);

    let config = SessionConfig::default().baud_rate(args.baud);
    let mut bbtk = BbtkConnector::connect(args.port.as_deref(), config)?;
    bbtk.reset_serial_buffers()?;

    if !bbtk.is_alive()? {
        println!("BBTK not responding to ECHO");
    }

    println!("Current thresholds: {:?}", bbtk.get_thresholds()?);

    bbtk.set_thresholds(&args.thresholds)?;

    println!("New thresholds: {:?}", bbtk.get_thresholds()?);
    bbtk.disconnect();

    Ok(())
}
