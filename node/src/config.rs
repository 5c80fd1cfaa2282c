//! Node configuration: a minimal `clap` CLI surface feeding a `NodeConfig`
//! loaded from an INI file, plus the `PublicKey.txt` reader spec.md §6
//! describes.
//!
//! Grounded on the teacher's `node/src/config.rs` (`clap::Parser`,
//! `validate()`) and spec.md §6's `hostInput`/`hostOutput`/`server`
//! schema. We own the schema and validation; the `ini` crate only parses
//! the file's section/key syntax.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use clap::Parser;
use ini::Ini;

use crate::error::{NodeError, NodeResult};

/// The minimal CLI surface: where things live on disk, and the handful of
/// overrides an operator needs without editing the INI file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "permissioned round-based blockchain node", long_about = None)]
pub struct NodeArgs {
    /// Directory holding the pool database, config.ini, and PublicKey.txt.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Config file path, relative to `data_dir` unless absolute.
    #[arg(long, default_value = "config.ini")]
    pub config: PathBuf,

    /// Overrides the `hostInput` address from the config file.
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl NodeArgs {
    pub fn parse_args() -> Self {
        NodeArgs::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        if self.config.is_absolute() {
            self.config.clone()
        } else {
            self.data_dir.join(&self.config)
        }
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.data_dir.join("PublicKey.txt")
    }

    pub fn pool_db_path(&self) -> PathBuf {
        self.data_dir.join("CREDITS")
    }
}

/// An `ip`/`port` pair as found under each INI section, per spec.md §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl HostAddr {
    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

/// The parsed `hostInput`/`hostOutput`/`server` sections plus the
/// `PublicKey.txt` contents, per spec.md §6.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// The address this node binds its UDP socket to (`hostInput`).
    pub host_input: HostAddr,
    /// The address this node advertises to peers for direct sends
    /// (`hostOutput`); usually equal to `host_input`.
    pub host_output: HostAddr,
    /// The signal/registration server's address (`server`).
    pub server: HostAddr,
    /// The 44-character public key text read from `PublicKey.txt`.
    pub public_key_text: String,
}

impl NodeConfig {
    pub fn load(args: &NodeArgs) -> NodeResult<Self> {
        let ini_path = args.config_path();
        let ini = Ini::load_from_file(&ini_path)
            .map_err(|err| NodeError::Config(format!("reading {}: {err}", ini_path.display())))?;

        let host_input = read_section(&ini, "hostInput")?;
        let host_output = read_section(&ini, "hostOutput")?;
        let server = read_section(&ini, "server")?;

        let key_path = args.public_key_path();
        let public_key_text = fs::read_to_string(&key_path)
            .map_err(|err| NodeError::Config(format!("reading {}: {err}", key_path.display())))?
            .trim()
            .to_string();

        let config = NodeConfig { host_input, host_output, server, public_key_text };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.public_key_text.len() != ringchain_core::PURE_PUBLIC_KEY_TEXT_LEN {
            return Err(NodeError::Config(format!(
                "PublicKey.txt must contain exactly {} characters, found {}",
                ringchain_core::PURE_PUBLIC_KEY_TEXT_LEN,
                self.public_key_text.len()
            )));
        }
        if self.host_input.port == 0 || self.host_output.port == 0 || self.server.port == 0 {
            return Err(NodeError::Config("ports must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn read_section(ini: &Ini, name: &str) -> NodeResult<HostAddr> {
    let section = ini
        .section(Some(name))
        .ok_or_else(|| NodeError::Config(format!("config file is missing the [{name}] section")))?;
    let ip: Ipv4Addr = section
        .get("ip")
        .ok_or_else(|| NodeError::Config(format!("[{name}] is missing `ip`")))?
        .parse()
        .map_err(|_| NodeError::Config(format!("[{name}].ip is not a valid IPv4 address")))?;
    let port: u16 = section
        .get("port")
        .ok_or_else(|| NodeError::Config(format!("[{name}] is missing `port`")))?
        .parse()
        .map_err(|_| NodeError::Config(format!("[{name}].port is not a valid u16")))?;
    Ok(HostAddr { ip, port })
}

/// Writes a `config.ini`/`PublicKey.txt` pair for tests that need a
/// `NodeConfig::load`-able fixture, mirroring the file layout an operator
/// would hand-author per spec.md §6.
#[cfg(test)]
pub fn write_fixture(dir: &Path, key_text: &str) -> NodeArgs {
    let ini_body = "\
[hostInput]
ip=127.0.0.1
port=4000

[hostOutput]
ip=127.0.0.1
port=4000

[server]
ip=127.0.0.1
port=4001
";
    fs::write(dir.join("config.ini"), ini_body).unwrap();
    fs::write(dir.join("PublicKey.txt"), key_text).unwrap();
    NodeArgs {
        data_dir: dir.to_path_buf(),
        config: PathBuf::from("config.ini"),
        bind: None,
        verbose: false,
    }
}
