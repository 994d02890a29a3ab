use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use itertools::Itertools;

use reencode::config::{ReencodeConfig, Settings, resolve_executable};

use crate::ReencodeArgs;

/// Highest constant quality value accepted by the x264 and x265 encoders.
const MAX_QUALITY: f32 = 51.0;

/// Final config combined from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    pub(crate) path: PathBuf,
    pub(crate) settings: Settings,
}

impl Config {
    /// Create config from given command line args and user config file.
    /// CLI arguments take priority over the user config.
    pub(crate) fn try_from_args(args: ReencodeArgs, user_config: ReencodeConfig) -> Result<Self> {
        let path = reencode::resolve_root_path(args.path.as_deref())?;
        let mut settings = Settings::from_user_config(user_config);

        if let Some(handbrake) = args.handbrake {
            settings.handbrake = resolve_executable(handbrake);
        }
        if let Some(quality) = args.quality {
            settings.profile.quality = quality;
        }
        if !(0.0..=MAX_QUALITY).contains(&settings.profile.quality) {
            reencode::print_warning!(
                "Quality {} is outside the HandBrake range 0-{MAX_QUALITY}",
                settings.profile.quality
            );
        }
        if !args.extension.is_empty() {
            settings.extensions = args.extension.iter().map(|ext| ext.to_lowercase()).unique().collect();
        }
        if let Some(seconds) = args.scan_timeout {
            settings.scan_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = args.encode_timeout {
            settings.encode_timeout = Duration::from_secs(seconds);
        }
        settings.overwrite |= args.force;
        settings.trash |= args.trash;
        settings.dry_run = args.print;
        settings.verbose |= args.verbose;

        Ok(Self {
            path,
            settings: settings.normalized(),
        })
    }
}
