use std::{env, time::Duration};

use cytec_switch::{config::InstrumentConfig, session::InstrumentSession};
use inquire::Select;
use serialport::{FlowControl, SerialPort};
use tracing_subscriber::EnvFilter;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// A status dump of a large matrix takes a while, keep the timeout generous.
const SERIAL_TIMEOUT_MS: u64 = 500;
const MODULES: usize = 8;
const OUTPUTS: usize = 16;
const MODULE: usize = 0;
const OUTPUT: usize = 3;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    let port = serialport::new(&port_name, BAUD_RATE)
        .flow_control(FlowControl::Hardware)
        .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let mut matrix: InstrumentSession<PortWrapper> =
        InstrumentSession::connect(PortWrapper(port), InstrumentConfig::new(MODULES, OUTPUTS))
            .expect("Failed to initialize switch matrix");

    println!("Relay states (one line per output):\n{}", matrix.matrix());

    // Close one relay
    let target = matrix.matrix().latch(MODULE, OUTPUT).unwrap();
    let observed = matrix.switch(&target, true).unwrap();
    println!("\nLatched module {MODULE} output {OUTPUT}:\n{observed}");

    // And open it again
    let target = observed.unlatch(MODULE, OUTPUT).unwrap();
    let observed = matrix.switch(&target, true).unwrap();
    println!("\nUnlatched module {MODULE} output {OUTPUT}:\n{observed}");
}
