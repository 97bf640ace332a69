use crate::bbtk::{Bbtk, BbtkError, CancelToken, UnconnectedBbtk};
use crate::session_config::SessionConfig;
use std::sync::mpsc;
use std::thread;

/// Environment variable naming the port a BBTK is attached to.
pub const PORT_ENV_VAR: &str = "BBTK_PORT";

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("BBTK error: {0}")]
    Bbtk(#[from] BbtkError),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("No serial ports found")]
    NoPorts,

    #[error("No BBTK answered on any of {scanned} serial ports. Please connect a BBTK or specify the port manually")]
    DeviceNotFound { scanned: usize },
}

pub struct BbtkConnector;

impl BbtkConnector {
    /// Port named by `BBTK_PORT`, if set and not empty.
    pub fn port_from_env() -> Option<String> {
        std::env::var(PORT_ENV_VAR)
            .ok()
            .filter(|port| !port.is_empty())
    }

    /// Names of every serial port on the system.
    pub fn list_ports() -> Result<Vec<String>, ConnectorError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }

    /// Open and handshake with a BBTK. Without an explicit port, `BBTK_PORT`
    /// is tried, then every serial port is probed.
    pub fn connect(port: Option<&str>, config: SessionConfig) -> Result<Bbtk, ConnectorError> {
        let port = match port.map(str::to_string).or_else(Self::port_from_env) {
            Some(port) => port,
            None => Self::detect(&config)?,
        };

        log::debug!("Connecting to BBTK on port {}", port);
        let mut bbtk = UnconnectedBbtk::open(&port, config)?;
        bbtk.reset_serial_buffers()?;
        Ok(bbtk.connect()?)
    }

    /// Probe every serial port at once and return the first one where a BBTK
    /// answers the handshake.
    pub fn detect(config: &SessionConfig) -> Result<String, ConnectorError> {
        let ports = Self::list_ports()?;
        if ports.is_empty() {
            return Err(ConnectorError::NoPorts);
        }
        log::debug!("Scanning {:?} for a BBTK", ports);

        Self::detect_with(&ports, &CancelToken::new(), |port| {
            UnconnectedBbtk::open(port, config.clone())
        })
        .ok_or(ConnectorError::DeviceNotFound {
            scanned: ports.len(),
        })
    }

    /// Probe `ports` concurrently, each with its own session opened by `open`.
    ///
    /// The first port to answer wins and the other probes are cancelled;
    /// a probe already waiting on a reply finishes that read first.
    pub fn detect_with<F>(ports: &[String], cancel: &CancelToken, open: F) -> Option<String>
    where
        F: Fn(&str) -> Result<UnconnectedBbtk, BbtkError> + Sync,
    {
        let (found_tx, found_rx) = mpsc::channel();

        thread::scope(|scope| {
            for port in ports {
                let found_tx = found_tx.clone();
                let open = &open;
                scope.spawn(move || {
                    if cancel.is_cancelled() {
                        return;
                    }
                    match Self::probe(port, open) {
                        Ok(()) => {
                            log::debug!("{}: BBTK found", port);
                            cancel.cancel();
                            let _ = found_tx.send(port.clone());
                        }
                        Err(e) => log::debug!("{}: no BBTK ({})", port, e),
                    }
                });
            }
        });
        drop(found_tx);

        found_rx.try_recv().ok()
    }

    fn probe<F>(port: &str, open: &F) -> Result<(), BbtkError>
    where
        F: Fn(&str) -> Result<UnconnectedBbtk, BbtkError>,
    {
        let mut candidate = open(port)?;
        candidate.reset_serial_buffers()?;
        candidate.connect()?.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::ScriptedDevice;
    use crate::serial_terminal::TerminalError;
    use std::io;
    use std::time::Duration;

    fn probe_config() -> SessionConfig {
        SessionConfig::default().read_timeout(Duration::from_millis(20))
    }

    fn fake_port(port: &str) -> Result<UnconnectedBbtk, BbtkError> {
        let device = match port {
            "/dev/ttyUSB1" => ScriptedDevice::new(|command| match command {
                "CONN" => Some(b"BBTK;\r\n".to_vec()),
                _ => None,
            }),
            "/dev/ttyS0" => ScriptedDevice::new(|_| Some(b"garbage\r\n".to_vec())),
            _ => ScriptedDevice::new(|_| None),
        };
        Ok(UnconnectedBbtk::from_transport(device.transport(), probe_config()))
    }

    fn ports(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_finds_answering_port() {
        let candidates = ports(&["/dev/ttyS0", "/dev/ttyUSB0", "/dev/ttyUSB1"]);
        let cancel = CancelToken::new();

        let found = BbtkConnector::detect_with(&candidates, &cancel, fake_port);

        assert_eq!(found.as_deref(), Some("/dev/ttyUSB1"));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_detect_without_bbtk() {
        let candidates = ports(&["/dev/ttyS0", "/dev/ttyUSB0"]);
        let cancel = CancelToken::new();

        assert_eq!(BbtkConnector::detect_with(&candidates, &cancel, fake_port), None);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_detect_skips_ports_that_fail_to_open() {
        let candidates = ports(&["/dev/missing", "/dev/ttyUSB1"]);
        let found = BbtkConnector::detect_with(&candidates, &CancelToken::new(), |port| {
            if port == "/dev/missing" {
                Err(TerminalError::Io(io::ErrorKind::NotFound.into()).into())
            } else {
                fake_port(port)
            }
        });

        assert_eq!(found.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_detect_cancelled_up_front() {
        let candidates = ports(&["/dev/ttyUSB1"]);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(BbtkConnector::detect_with(&candidates, &cancel, fake_port), None);
    }
}
