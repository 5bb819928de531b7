// Configuration management with layered configuration (defaults, JSON file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the user's home holding config, logos and temp files
pub const APP_DIR: &str = ".aca/workflows";

/// Name of the configuration file inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.json";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub paths: PathsConfig,
    pub dryrun: DryRunConfig,
    pub thumbnails: ThumbnailConfig,
    pub watermark: WatermarkConfig,
    pub formats: FormatConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the master files; record filenames are relative to it
    pub master_root: PathBuf,
    /// Root of the generated access files, one subdirectory per record
    pub access_root: PathBuf,
    pub app_dir: PathBuf,
    /// Environment variable that is only set where the shared storage is mounted
    pub shared_storage_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunConfig {
    pub master_root: PathBuf,
    pub access_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    pub small: u32,
    pub medium: u32,
    pub large: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub width: u32,
    pub height: u32,
    pub white_logo: PathBuf,
    pub black_logo: PathBuf,
}

impl WatermarkConfig {
    /// Logo paths, relative ones resolved against the application directory
    pub fn logo_paths(&self, app_dir: &Path) -> (PathBuf, PathBuf) {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                app_dir.join(p)
            }
        };
        (resolve(&self.white_logo), resolve(&self.black_logo))
    }
}

/// Recognised extensions, space-delimited (".jpg .tif ...")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    pub image: String,
    pub video: String,
    pub audio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Public URL prefix used to build remote paths: {root_url}/{container}/{id}/{file}
    pub root_url: String,
    pub container: String,
    #[serde(default = "default_test_container")]
    pub test_container: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_test_container() -> String {
    "test".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub pdftoppm: PathBuf,
    /// CRF value passed to the video encoder
    pub video_quality: u8,
    pub frame_offset_seconds: u32,
    pub thumbnail_timeout_seconds: u64,
    pub min_transcode_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Settings {
    /// Default location of the configuration file
    pub fn default_config_path() -> PathBuf {
        home_dir().join(APP_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration with layered precedence: defaults → file → env.
    /// The file is required.
    pub fn load_from_path<P: AsRef<Path>>(config_file: P) -> Result<Self, ConfigError> {
        let config_file = config_file.as_ref();

        let builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_file).required(true))
            .add_source(
                Environment::with_prefix("ACA")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.thumbnails.small == 0 || self.thumbnails.medium == 0 || self.thumbnails.large == 0 {
            return Err("Thumbnail sizes must be greater than 0".to_string());
        }

        if self.watermark.width == 0 || self.watermark.height == 0 {
            return Err("Watermark width and height must be greater than 0".to_string());
        }

        if self.formats.image.split_whitespace().next().is_none() {
            return Err("At least one image format must be configured".to_string());
        }

        if self.storage.container.is_empty() || self.storage.test_container.is_empty() {
            return Err("Storage container names cannot be empty".to_string());
        }
        if self.storage.root_url.is_empty() {
            return Err("Storage root_url cannot be empty".to_string());
        }

        if self.tools.thumbnail_timeout_seconds == 0 {
            return Err("Tools thumbnail_timeout_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Settings {
    fn default() -> Self {
        let home = home_dir();
        let app_dir = home.join(APP_DIR);
        Self {
            paths: PathsConfig {
                master_root: PathBuf::from("M:/master"),
                access_root: home.join("access"),
                app_dir: app_dir.clone(),
                shared_storage_env: "OneDrive".to_string(),
            },
            dryrun: DryRunConfig {
                master_root: home.join("Downloads").join("workflow_masterfiles"),
                access_root: home.join("Downloads").join("workflow_accessfiles"),
            },
            thumbnails: ThumbnailConfig {
                small: 150,
                medium: 640,
                large: 1920,
            },
            watermark: WatermarkConfig {
                width: 160,
                height: 51,
                white_logo: PathBuf::from("images/logo_white_160x51.png"),
                black_logo: PathBuf::from("images/logo_black_160x51.png"),
            },
            formats: FormatConfig {
                image: ".tif .tiff .jpg .jpeg .png .bmp .gif .webp".to_string(),
                video: ".mp4 .mov .avi .mpg .mpeg .m4v .mkv .wmv".to_string(),
                audio: ".mp3 .wav .m4a .aac .flac .ogg .wma".to_string(),
            },
            storage: StorageConfig {
                root_url: "https://acastorage.blob.core.windows.net".to_string(),
                container: "sam-access".to_string(),
                test_container: default_test_container(),
                endpoint: "http://localhost:9000".to_string(),
                region: "us-east-1".to_string(),
                access_key: String::new(),
                secret_key: String::new(),
            },
            tools: ToolsConfig {
                ffmpeg: app_dir.join("bin").join("ffmpeg"),
                pdftoppm: PathBuf::from("pdftoppm"),
                video_quality: 30,
                frame_offset_seconds: 12,
                thumbnail_timeout_seconds: 30,
                min_transcode_timeout_seconds: 120,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
