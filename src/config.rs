use std::{
    fs,
    net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr},
    num::ParseIntError,
    path::PathBuf,
};

pub const CONFIG_FILE: &str = "server_config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub proxy_addr: SocketAddr,
    pub pool_size: usize,
    pub resource_dir: PathBuf,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    PoolSizeZero,
    #[error("invalid pool size: {0}")]
    PoolSizeParseError(#[from] ParseIntError),
    #[error("invalid socket address: {0}")]
    BadServerAddr(#[from] AddrParseError),
    #[error("resource directory does not exist: {0}")]
    ResourceDirDoesNotExist(PathBuf),
    #[error("resource directory: {0}")]
    ResourceDirIoError(#[from] std::io::Error),
    #[error("unknown CLI argument flag: {0}")]
    UnknownFlag(String),
    #[error("missing value for {0}")]
    MissingValue(&'static str),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Builder {
    server_addr: Option<SocketAddr>,
    proxy_addr: Option<SocketAddr>,
    pool_size: Option<usize>,
    resource_dir: Option<PathBuf>,
}

impl Builder {
    fn new() -> Builder {
        Builder::default()
    }

    #[must_use]
    pub fn build(self) -> Config {
        let localhost = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        Config {
            server_addr: self
                .server_addr
                .unwrap_or(SocketAddr::new(localhost, 4221)),
            proxy_addr: self.proxy_addr.unwrap_or(SocketAddr::new(localhost, 8888)),
            pool_size: self.pool_size.unwrap_or(1),
            resource_dir: self
                .resource_dir
                .unwrap_or_else(|| PathBuf::from("./resources")),
        }
    }

    /// Config builder from CLI args
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` variant
    pub fn from_cli_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut builder = Self::new();
        let mut iter = args.iter();
        iter.next(); // executable path
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--address" | "-a" => {
                    let addr = iter.next().ok_or(ConfigError::MissingValue("--address"))?;
                    builder.server_addr = Some(addr.parse()?);
                }
                "--proxy-address" | "-p" => {
                    let addr = iter
                        .next()
                        .ok_or(ConfigError::MissingValue("--proxy-address"))?;
                    builder.proxy_addr = Some(addr.parse()?);
                }
                "--pool-size" | "-s" => {
                    let size = iter.next().ok_or(ConfigError::MissingValue("--pool-size"))?;
                    builder.pool_size = Some(parse_pool_size(size)?);
                }
                "--resource-dir" | "-r" => {
                    let dir = iter
                        .next()
                        .ok_or(ConfigError::MissingValue("--resource-dir"))?;
                    builder.resource_dir = Some(existing_dir(dir)?);
                }
                _ => return Err(ConfigError::UnknownFlag(arg.to_string())),
            }
        }

        Ok(builder)
    }

    /// Config builder from env. variables
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` variant
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Self::new();

        if let Some(val) = lookup("ADDRESS") {
            builder.server_addr = Some(val.parse()?);
        }
        if let Some(val) = lookup("PROXY_ADDRESS") {
            builder.proxy_addr = Some(val.parse()?);
        }
        if let Some(val) = lookup("POOL_SIZE") {
            builder.pool_size = Some(parse_pool_size(&val)?);
        }
        if let Some(val) = lookup("RESOURCE_DIR") {
            builder.resource_dir = Some(existing_dir(&val)?);
        }

        Ok(builder)
    }

    /// Config builder from the `[server]` section of a config file. A
    /// missing file yields an empty builder.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` variant
    pub fn from_config_file(cfg_path: &str) -> Result<Self, ConfigError> {
        match fs::read_to_string(cfg_path) {
            Ok(content) => Self::from_config_str(&content),
            Err(err) => {
                tracing::debug!(cfg_path, error = %err, "no config file read");
                Ok(Self::new())
            }
        }
    }

    fn from_config_str(content: &str) -> Result<Self, ConfigError> {
        let mut builder = Self::new();
        let mut in_server_section = false;

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_server_section = line == "[server]";
                continue;
            }
            if !in_server_section {
                continue;
            }

            if let Some((cfg_key, cfg_value)) = line.split_once('=') {
                let cfg_key = cfg_key.trim();
                let cfg_value = cfg_value.trim().trim_matches('"');
                match cfg_key {
                    "address" => builder.server_addr = Some(cfg_value.parse()?),
                    "proxy_address" => builder.proxy_addr = Some(cfg_value.parse()?),
                    "pool_size" => builder.pool_size = Some(parse_pool_size(cfg_value)?),
                    "resource_dir" => builder.resource_dir = Some(existing_dir(cfg_value)?),
                    _ => tracing::warn!(
                        cfg_key,
                        cfg_value,
                        "unknown key in config file [server] section"
                    ),
                }
            }
        }

        Ok(builder)
    }

    /// Field-wise merge, `self` wins.
    #[must_use]
    pub fn merge(&self, other: &Builder) -> Builder {
        Builder {
            server_addr: self.server_addr.or(other.server_addr),
            proxy_addr: self.proxy_addr.or(other.proxy_addr),
            pool_size: self.pool_size.or(other.pool_size), // NOTE: usize is Copy, no clone needed
            resource_dir: self.resource_dir.clone().or(other.resource_dir.clone()),
        }
    }
}

fn parse_pool_size(value: &str) -> Result<usize, ConfigError> {
    let size = value.trim().parse::<usize>()?;
    if size == 0 {
        return Err(ConfigError::PoolSizeZero);
    }
    Ok(size)
}

fn existing_dir(value: &str) -> Result<PathBuf, ConfigError> {
    match fs::canonicalize(value) {
        Ok(path) => Ok(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::ResourceDirDoesNotExist(PathBuf::from(value)))
        }
        Err(e) => Err(ConfigError::ResourceDirIoError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("relay-http")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = Builder::new().build();
        assert_eq!(cfg.server_addr, "127.0.0.1:4221".parse().unwrap());
        assert_eq!(cfg.proxy_addr, "127.0.0.1:8888".parse().unwrap());
        assert_eq!(cfg.pool_size, 1);
        assert_eq!(cfg.resource_dir, PathBuf::from("./resources"));
    }

    #[test]
    fn test_cli_args() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        let cfg = Builder::from_cli_args(&args(&[
            "-a",
            "0.0.0.0:80",
            "--proxy-address",
            "0.0.0.0:8080",
            "-s",
            "4",
            "--resource-dir",
            dir_str,
        ]))
        .unwrap()
        .build();

        assert_eq!(cfg.server_addr, "0.0.0.0:80".parse().unwrap());
        assert_eq!(cfg.proxy_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.resource_dir, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_cli_errors() {
        assert!(matches!(
            Builder::from_cli_args(&args(&["--pool-size", "0"])),
            Err(ConfigError::PoolSizeZero)
        ));
        assert!(matches!(
            Builder::from_cli_args(&args(&["--address"])),
            Err(ConfigError::MissingValue("--address"))
        ));
        assert!(matches!(
            Builder::from_cli_args(&args(&["--address", "nowhere"])),
            Err(ConfigError::BadServerAddr(_))
        ));
        assert!(matches!(
            Builder::from_cli_args(&args(&["--verbose"])),
            Err(ConfigError::UnknownFlag(_))
        ));
        assert!(matches!(
            Builder::from_cli_args(&args(&["-r", "/definitely/not/here"])),
            Err(ConfigError::ResourceDirDoesNotExist(_))
        ));
    }

    #[test]
    fn test_env_lookup() {
        let builder = Builder::from_lookup(|key| match key {
            "ADDRESS" => Some("127.0.0.1:9000".into()),
            "POOL_SIZE" => Some("2".into()),
            _ => None,
        })
        .unwrap();
        let cfg = builder.build();

        assert_eq!(cfg.server_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.proxy_addr, "127.0.0.1:8888".parse().unwrap());
    }

    #[test]
    fn test_config_file_server_section_only() {
        let content = "\
# relay-http
[logging]
address = 10.0.0.1:1

[server]
address = \"127.0.0.1:7000\"
pool_size = 3
";
        let cfg = Builder::from_config_str(content).unwrap().build();
        assert_eq!(cfg.server_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(cfg.pool_size, 3);
    }

    #[test]
    fn test_missing_config_file_is_empty() {
        let builder = Builder::from_config_file("/definitely/not/here.toml").unwrap();
        assert_eq!(builder, Builder::new());
    }

    #[test]
    fn test_merge_prefers_self() {
        let cli = Builder {
            pool_size: Some(8),
            ..Builder::new()
        };
        let env = Builder {
            pool_size: Some(2),
            server_addr: Some("127.0.0.1:1234".parse().unwrap()),
            ..Builder::new()
        };

        let cfg = cli.merge(&env).build();
        assert_eq!(cfg.pool_size, 8);
        assert_eq!(cfg.server_addr, "127.0.0.1:1234".parse().unwrap());
    }
}
