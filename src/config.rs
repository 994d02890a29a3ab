//! User config file and the runtime settings of a batch.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;

use crate::print_error;
use crate::profile::EncodeProfile;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Video extensions picked up by discovery
pub const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "avi", "mov", "m4v", "wmv"];

/// Container extension of the transcoded output
pub const DEFAULT_TARGET_EXTENSION: &str = "mp4";

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DELETE_RETRIES: u32 = 3;

#[cfg(windows)]
const DEFAULT_HANDBRAKE_CLI: &str = r"C:\Program Files\HandBrake\HandBrakeCLI.exe";

#[cfg(not(windows))]
const DEFAULT_HANDBRAKE_CLI: &str = "HandBrakeCLI";

/// Path to the user config file: `$HOME/.config/reencode.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct ReencodeConfig {
    #[serde(default)]
    pub handbrake: Option<PathBuf>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub target_extension: Option<String>,
    /// Seconds
    #[serde(default)]
    pub scan_timeout: Option<u64>,
    /// Seconds
    #[serde(default)]
    pub encode_timeout: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub trash: bool,
    #[serde(default)]
    pub delete_retries: Option<u32>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub profile: Option<EncodeProfile>,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    reencode: ReencodeConfig,
}

/// Everything the core needs to run a batch.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the HandBrakeCLI executable.
    pub handbrake: PathBuf,
    /// Lowercase extensions without the leading dot.
    pub extensions: Vec<String>,
    pub target_extension: String,
    pub profile: EncodeProfile,
    pub scan_timeout: Duration,
    pub encode_timeout: Duration,
    /// How often a running subprocess is checked for exit, timeout and stop requests.
    pub poll_interval: Duration,
    /// Replace an existing output file instead of skipping the input.
    pub overwrite: bool,
    /// Move originals to the trash instead of deleting them.
    pub trash: bool,
    /// Extra attempts after a failed delete of the original.
    pub delete_retries: u32,
    pub delete_retry_delay: Duration,
    /// Log the commands without running them.
    pub dry_run: bool,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            handbrake: PathBuf::from(DEFAULT_HANDBRAKE_CLI),
            extensions: lowercase_vec(DEFAULT_EXTENSIONS),
            target_extension: DEFAULT_TARGET_EXTENSION.to_string(),
            profile: EncodeProfile::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            encode_timeout: DEFAULT_ENCODE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            overwrite: false,
            trash: false,
            delete_retries: DEFAULT_DELETE_RETRIES,
            delete_retry_delay: Duration::from_millis(500),
            dry_run: false,
            verbose: false,
        }
    }
}

impl ReencodeConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    pub fn get_user_config() -> Self {
        CONFIG_PATH
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| {
                fs::read_to_string(path)
                    .map_err(|e| {
                        print_error!("Error reading config file {}: {e}", path.display());
                    })
                    .ok()
            })
            .and_then(|config_string| Self::from_toml_str(&config_string))
            .unwrap_or_default()
    }

    /// Parse the `[reencode]` section from a config file string.
    #[must_use]
    pub fn from_toml_str(config_string: &str) -> Option<Self> {
        toml::from_str::<UserConfig>(config_string)
            .map_err(|e| {
                print_error!("Error reading config file: {e}");
            })
            .ok()
            .map(|config| config.reencode)
    }
}

impl Settings {
    /// Apply user config file values on top of the defaults.
    #[must_use]
    pub fn from_user_config(user_config: ReencodeConfig) -> Self {
        let defaults = Self::default();
        let extensions = if user_config.extensions.is_empty() {
            defaults.extensions
        } else {
            lowercase_vec(&user_config.extensions)
        };
        Self {
            handbrake: resolve_executable(user_config.handbrake.unwrap_or(defaults.handbrake)),
            extensions,
            target_extension: user_config
                .target_extension
                .map_or(defaults.target_extension, |ext| normalize_extension(&ext)),
            profile: user_config.profile.unwrap_or_default(),
            scan_timeout: user_config
                .scan_timeout
                .map_or(defaults.scan_timeout, Duration::from_secs),
            encode_timeout: user_config
                .encode_timeout
                .map_or(defaults.encode_timeout, Duration::from_secs),
            overwrite: user_config.overwrite,
            trash: user_config.trash,
            delete_retries: user_config.delete_retries.unwrap_or(defaults.delete_retries),
            verbose: user_config.verbose,
            ..defaults
        }
        .normalized()
    }

    /// Drop duplicate extensions and the target extension from the allow-list,
    /// so an output file can never be picked up as an input.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.target_extension = normalize_extension(&self.target_extension);
        let mut extensions: Vec<String> = Vec::with_capacity(self.extensions.len());
        for ext in self.extensions.iter().map(|e| normalize_extension(e)) {
            if ext != self.target_extension && !ext.is_empty() && !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        self.extensions = extensions;
        self.handbrake = resolve_executable(self.handbrake);
        self
    }
}

/// Look up a bare program name from `PATH`.
/// Paths with a directory component are returned as is.
#[must_use]
pub fn resolve_executable(program: PathBuf) -> PathBuf {
    if program.components().count() != 1 || program.is_file() {
        return program;
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return program;
    };
    std::env::split_paths(&paths)
        .flat_map(|dir| {
            let candidate = dir.join(&program);
            let with_exe = candidate.with_extension(std::env::consts::EXE_EXTENSION);
            [candidate, with_exe]
        })
        .find(|candidate| candidate.is_file())
        .unwrap_or(program)
}

/// Lowercase and strip a leading dot: `.MKV` -> `mkv`.
fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Convert a slice of strings to lowercase.
fn lowercase_vec(slice: &[impl AsRef<str>]) -> Vec<String> {
    slice.iter().map(|s| s.as_ref().to_lowercase()).collect()
}
