// Port detection example
//
// Lists the serial ports on this machine and probes all of them for a BBTK.

use bbtk_rs::{BbtkConnector, ConnectorError, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let ports = BbtkConnector::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found!");
        return Ok(());
    }

    println!("Scanning {} port(s) for a BBTK:", ports.len());
    for port in &ports {
        println!("  {port}");
    }

    match BbtkConnector::detect(&SessionConfig::default()) {
        Ok(port) => println!("BBTK found at {port}"),
        Err(ConnectorError::DeviceNotFound { .. }) => println!("No BBTK found"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
