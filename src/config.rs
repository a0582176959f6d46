//! Command-line configuration for the two binaries.
//!
//! Spec §1 scopes "command-line argument parsing" out as peripheral
//! machinery, and the reference itself parses `std::env::args()` by hand
//! (`examples/mirror_fs/main.rs`) rather than pulling in a CLI-parsing crate.
//! Docspp keeps that same manual, flag-matching style for the keys spec §6
//! assigns to each component, with the defaults spec §5 gives for the
//! heartbeat interval and dead threshold.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};

/// Default heartbeat emission interval (spec §5, `T_beat`).
pub const DEFAULT_T_BEAT: Duration = Duration::from_secs(30);
/// Default SN liveness threshold (spec §5, `T_dead`, >= 3x `T_beat`).
pub const DEFAULT_T_DEAD: Duration = Duration::from_secs(90);

/// Storage node configuration (spec §6: `ss_id`, `base_path`, `nn_address`,
/// `nn_port`, `client_port`, `ss_port`).
#[derive(Debug, Clone)]
pub struct SnConfig {
    pub ss_id: u32,
    pub base_path: PathBuf,
    pub nn_address: String,
    pub nn_port: u16,
    pub client_port: u16,
    pub ss_port: u16,
    pub t_beat: Duration,
}

impl SnConfig {
    const USAGE: &'static str = "Usage: storage_node --id <ID> --base-path <DIR> --nn <HOST:PORT> \
         --client-port <PORT> --ss-port <PORT> [--heartbeat-secs <N>]";

    pub fn parse_args(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut ss_id = None;
        let mut base_path = None;
        let mut nn_address = None;
        let mut nn_port = None;
        let mut client_port = None;
        let mut ss_port = None;
        let mut t_beat = DEFAULT_T_BEAT;

        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    println!("{}", Self::USAGE);
                    std::process::exit(0);
                }
                "--id" => ss_id = Some(next_value(&mut args, "--id")?.parse()?),
                "--base-path" => base_path = Some(PathBuf::from(next_value(&mut args, "--base-path")?)),
                "--nn" => {
                    let (host, port) = split_host_port(&next_value(&mut args, "--nn")?)?;
                    nn_address = Some(host);
                    nn_port = Some(port);
                }
                "--client-port" => client_port = Some(next_value(&mut args, "--client-port")?.parse()?),
                "--ss-port" => ss_port = Some(next_value(&mut args, "--ss-port")?.parse()?),
                "--heartbeat-secs" => {
                    t_beat = Duration::from_secs(next_value(&mut args, "--heartbeat-secs")?.parse()?)
                }
                other => bail!("unknown flag: {other}\n{}", Self::USAGE),
            }
        }

        Ok(Self {
            ss_id: ss_id.ok_or_else(|| anyhow!("missing --id\n{}", Self::USAGE))?,
            base_path: base_path.ok_or_else(|| anyhow!("missing --base-path\n{}", Self::USAGE))?,
            nn_address: nn_address.ok_or_else(|| anyhow!("missing --nn\n{}", Self::USAGE))?,
            nn_port: nn_port.ok_or_else(|| anyhow!("missing --nn\n{}", Self::USAGE))?,
            client_port: client_port.ok_or_else(|| anyhow!("missing --client-port\n{}", Self::USAGE))?,
            ss_port: ss_port.ok_or_else(|| anyhow!("missing --ss-port\n{}", Self::USAGE))?,
            t_beat,
        })
    }
}

/// Name node configuration (spec §6: `port`, `max_sn`, `max_clients`,
/// `max_files`, `t_beat`, `t_dead`).
#[derive(Debug, Clone)]
pub struct NnConfig {
    pub port: u16,
    pub max_sn: usize,
    pub max_clients: usize,
    pub max_files: usize,
    pub t_beat: Duration,
    pub t_dead: Duration,
}

impl Default for NnConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_sn: 10,
            max_clients: 100,
            max_files: 10_000,
            t_beat: DEFAULT_T_BEAT,
            t_dead: DEFAULT_T_DEAD,
        }
    }
}

impl NnConfig {
    const USAGE: &'static str = "Usage: name_node [--port <PORT>] [--max-sn <N>] [--max-clients <N>] \
         [--max-files <N>] [--heartbeat-secs <N>] [--dead-secs <N>]";

    pub fn parse_args(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut cfg = Self::default();
        let mut args = args.peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    println!("{}", Self::USAGE);
                    std::process::exit(0);
                }
                "--port" => cfg.port = next_value(&mut args, "--port")?.parse()?,
                "--max-sn" => cfg.max_sn = next_value(&mut args, "--max-sn")?.parse()?,
                "--max-clients" => cfg.max_clients = next_value(&mut args, "--max-clients")?.parse()?,
                "--max-files" => cfg.max_files = next_value(&mut args, "--max-files")?.parse()?,
                "--heartbeat-secs" => {
                    cfg.t_beat = Duration::from_secs(next_value(&mut args, "--heartbeat-secs")?.parse()?)
                }
                "--dead-secs" => {
                    cfg.t_dead = Duration::from_secs(next_value(&mut args, "--dead-secs")?.parse()?)
                }
                other => bail!("unknown flag: {other}\n{}", Self::USAGE),
            }
        }
        Ok(cfg)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().with_context(|| format!("{flag} requires a value"))
}

fn split_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = s.rsplit_once(':').ok_or_else(|| anyhow!("expected HOST:PORT, got {s}"))?;
    Ok((host.to_string(), port.parse()?))
}
