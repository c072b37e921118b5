use std::path::PathBuf;

use clap::Parser;

/// Flags recognised by `atophttpd`, per SPEC_FULL.md §6.2. `clap`'s
/// derive API supplies `-h/--help` and `-V/--version` for free, the
/// same way the teacher's own binaries (`jetstream-otel-bridge`,
/// `packelf`) derive their CLI surface.
#[derive(Parser, Debug)]
#[command(name = "atophttpd", about = "HTTP(S) server for atop rawlog archives")]
pub struct Config {
    /// Detach from the controlling terminal at startup.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Enable debug log lines.
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Plaintext listen port.
    #[arg(short = 'p', long, default_value_t = 2867)]
    pub port: u16,

    /// Plaintext bind address (`*` = any IPv4, `::*` = any IPv6).
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    pub addr: String,

    /// Log directory to scan.
    #[arg(short = 'P', long, default_value = "/var/log/atop")]
    pub path: PathBuf,

    /// Enable TLS on the given port (default 2868 if given with no value).
    #[arg(short = 't', long, num_args = 0..=1, default_missing_value = "2868")]
    pub tls_port: Option<u16>,

    /// TLS bind address.
    #[arg(short = 'A', long, default_value = "::*")]
    pub tls_addr: String,

    /// CA certificate file (required for TLS, mutual verification).
    #[arg(short = 'C', long)]
    pub ca_cert_file: Option<PathBuf>,

    /// Server certificate file (required for TLS).
    #[arg(short = 'c', long)]
    pub cert_file: Option<PathBuf>,

    /// Server private key file (required for TLS).
    #[arg(short = 'k', long)]
    pub key_file: Option<PathBuf>,

    /// Replace every emitted command line with "***".
    #[arg(short = 'H', long)]
    pub hide_cmdline: bool,
}

impl Config {
    pub fn tls_config(&self) -> Option<atophttpd_conn::TlsConfig> {
        let (ca, cert, key) = (
            self.ca_cert_file.as_ref()?,
            self.cert_file.as_ref()?,
            self.key_file.as_ref()?,
        );
        Some(atophttpd_conn::TlsConfig {
            ca_cert_file: ca.clone(),
            cert_file: cert.clone(),
            key_file: key.clone(),
        })
    }
}
