use anyhow::Result;
use log::debug;
use serde_json::from_str;
use std::{
    convert::AsRef,
    env,
    fs::read_to_string,
    path::{Path as FsPath, PathBuf},
    time::Duration,
};

/// The on disk format, encoded as JSON
mod file {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(super) struct Config {
        pub(super) window_capacity: Option<usize>,
        pub(super) mailbox_depth: Option<usize>,
        pub(super) push_cadence_secs: Option<u64>,
        pub(super) stale_after_secs: Option<u64>,
        pub(super) housekeeping_secs: Option<u64>,
    }
}

/// Tuning for the telemetry core.
#[derive(Debug, Clone)]
pub struct Config {
    /// bounded history per metric per farm, the chart depth
    pub window_capacity: usize,
    /// per subscriber queue depth; the oldest undelivered event is
    /// conflated away when a consumer falls this far behind
    pub mailbox_depth: usize,
    /// the cadence the backend is expected to push at
    pub push_cadence: Duration,
    /// mark a farm Stale when nothing arrived for this long
    pub stale_after: Duration,
    /// period of the per stream housekeeping timer
    pub housekeeping: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let push_cadence = Duration::from_secs(5);
        Config {
            window_capacity: 100,
            mailbox_depth: 8,
            push_cadence,
            // three missed pushes count as silence
            stale_after: push_cadence * 3,
            housekeeping: push_cadence,
        }
    }
}

impl Config {
    pub fn parse(s: &str) -> Result<Config> {
        let cfg: file::Config = from_str(s)?;
        let def = Config::default();
        let window_capacity = cfg.window_capacity.unwrap_or(def.window_capacity);
        if window_capacity == 0 {
            bail!("window_capacity must be nonzero");
        }
        let mailbox_depth = cfg.mailbox_depth.unwrap_or(def.mailbox_depth);
        if mailbox_depth == 0 {
            bail!("mailbox_depth must be nonzero");
        }
        let push_cadence = cfg
            .push_cadence_secs
            .map(Duration::from_secs)
            .unwrap_or(def.push_cadence);
        if push_cadence.is_zero() {
            bail!("push_cadence_secs must be nonzero");
        }
        let stale_after = cfg
            .stale_after_secs
            .map(Duration::from_secs)
            .unwrap_or(push_cadence * 3);
        if stale_after < push_cadence {
            bail!("stale_after_secs must be at least one push cadence");
        }
        let housekeeping =
            cfg.housekeeping_secs.map(Duration::from_secs).unwrap_or(push_cadence);
        if housekeeping.is_zero() {
            bail!("housekeeping_secs must be nonzero");
        }
        Ok(Config { window_capacity, mailbox_depth, push_cadence, stale_after, housekeeping })
    }

    /// Load the config from the specified file.
    pub fn load<P: AsRef<FsPath>>(file: P) -> Result<Config> {
        Config::parse(&read_to_string(file)?)
    }

    /// This will try in order,
    ///
    /// * $AGROLINK_CFG
    /// * ${dirs::config_dir}/agrolink/telemetry.json
    /// * ${dirs::home_dir}/.config/agrolink/telemetry.json
    /// * C:\agrolink\telemetry.json on windows
    /// * /etc/agrolink/telemetry.json on unix
    ///
    /// It will load the first file that exists, if that file fails to
    /// load then Err will be returned.
    pub fn load_default() -> Result<Config> {
        if let Some(cfg) = env::var_os("AGROLINK_CFG") {
            let cfg = PathBuf::from(cfg);
            if cfg.is_file() {
                debug!("loading {}", cfg.to_string_lossy());
                return Config::load(cfg);
            }
        }
        if let Some(mut cfg) = dirs::config_dir() {
            cfg.push("agrolink");
            cfg.push("telemetry.json");
            if cfg.is_file() {
                debug!("loading {}", cfg.to_string_lossy());
                return Config::load(cfg);
            }
        }
        if let Some(mut home) = dirs::home_dir() {
            home.push(".config");
            home.push("agrolink");
            home.push("telemetry.json");
            if home.is_file() {
                debug!("loading {}", home.to_string_lossy());
                return Config::load(home);
            }
        }
        let dir = if cfg!(windows) {
            PathBuf::from("C:\\agrolink\\telemetry.json")
        } else {
            PathBuf::from("/etc/agrolink/telemetry.json")
        };
        if dir.is_file() {
            debug!("loading {}", dir.to_string_lossy());
            return Config::load(dir);
        }
        bail!("no default config file was found")
    }
}
