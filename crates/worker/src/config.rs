//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use pickabook_cloud::S3Config;
use pickabook_core::artifact::DEFAULT_MIN_ISLAND_AREA;
use pickabook_core::quality::{PhotoQuality, DEFAULT_MIN_PHOTO_DIMENSION, DEFAULT_MIN_SHARPNESS};
use pickabook_core::retry::RetryPolicy;
use pickabook_inference::generator::DEFAULT_MODEL;

use crate::runner::{DEFAULT_MAX_ATTEMPTS, DEFAULT_STALE_AFTER};

const DEFAULT_ASSETS_ROOT: &str = "./assets";
const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 180;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MIN_IDENTITY_SIMILARITY: f32 = 0.3;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_SECS: u64 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ReplicateSettings {
    pub api_url: String,
    pub token: String,
    pub model: String,
}

/// Publication into a directory served as static files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPublish {
    pub public_dir: PathBuf,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub assets_root: PathBuf,
    pub orders_root: PathBuf,
    pub replicate: ReplicateSettings,
    pub face_service_url: String,
    /// `None` selects the built-in color-key remover.
    pub background_removal_url: Option<String>,
    pub local_publish: Option<LocalPublish>,
    pub s3: Option<S3Config>,
    pub poll_interval: Duration,
    /// In-progress orders idle this long are reclaimed.
    pub stale_after: Duration,
    pub max_order_attempts: i32,
    pub retry: RetryPolicy,
    /// Bound on fetching a photo or a generated output.
    pub download_timeout: Duration,
    pub min_island_area: u32,
    pub photo_quality: PhotoQuality,
    pub min_identity_similarity: f32,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                            |
    /// |--------------------------|------------------------------------|
    /// | `DATABASE_URL`           | required                           |
    /// | `ASSETS_ROOT`            | `./assets`                         |
    /// | `ORDERS_ROOT`            | `<ASSETS_ROOT>/orders`             |
    /// | `REPLICATE_API_TOKEN`    | required                           |
    /// | `REPLICATE_API_URL`      | `https://api.replicate.com`        |
    /// | `REPLICATE_MODEL`        | `google/gemini-2.5-flash-image`    |
    /// | `FACE_SERVICE_URL`       | required                           |
    /// | `BACKGROUND_REMOVAL_URL` | built-in color key                 |
    /// | `POLL_INTERVAL_SECS`     | `5`                                |
    /// | `STALE_ORDER_SECS`       | `1800`                             |
    /// | `MAX_ORDER_ATTEMPTS`     | `3`                                |
    /// | `GENERATION_TIMEOUT_SECS`| `180`                              |
    /// | `DOWNLOAD_TIMEOUT_SECS`  | `60`                               |
    /// | `RETRY_MAX_ATTEMPTS`     | `3`                                |
    /// | `RETRY_BASE_DELAY_SECS`  | `5`                                |
    /// | `MIN_ISLAND_AREA`        | `5000`                             |
    /// | `MIN_PHOTO_DIMENSION`    | `500` (`0` disables)               |
    /// | `MIN_PHOTO_SHARPNESS`    | `100` (`0` disables)               |
    /// | `MIN_IDENTITY_SIMILARITY`| `0.3`                              |
    ///
    /// `PUBLIC_DIR`/`PUBLIC_BASE_URL` enable local publication and
    /// `S3_BUCKET` (plus the other `S3_*` variables) enables S3.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let assets_root = PathBuf::from(var("ASSETS_ROOT").unwrap_or_else(|| DEFAULT_ASSETS_ROOT.into()));
        let orders_root = var("ORDERS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| assets_root.join("orders"));

        let replicate = ReplicateSettings {
            api_url: var("REPLICATE_API_URL").unwrap_or_else(|| DEFAULT_REPLICATE_API_URL.into()),
            token: required("REPLICATE_API_TOKEN")?,
            model: var("REPLICATE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
        };

        let local_publish = match (var("PUBLIC_DIR"), var("PUBLIC_BASE_URL")) {
            (Some(dir), Some(base_url)) => Some(LocalPublish {
                public_dir: PathBuf::from(dir),
                base_url,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "PUBLIC_DIR",
                    missing: "PUBLIC_BASE_URL",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    present: "PUBLIC_BASE_URL",
                    missing: "PUBLIC_DIR",
                })
            }
            (None, None) => None,
        };

        let s3 = var("S3_BUCKET").map(|bucket| S3Config {
            bucket,
            region: var("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.into()),
            endpoint: var("S3_ENDPOINT"),
            access_key_id: var("S3_ACCESS_KEY_ID"),
            secret_access_key: var("S3_SECRET_ACCESS_KEY"),
            public_base_url: var("S3_PUBLIC_BASE_URL"),
        });

        let retry = RetryPolicy {
            max_attempts: parse_or(&var, "RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?,
            base_delay: Duration::from_secs(parse_or(
                &var,
                "RETRY_BASE_DELAY_SECS",
                DEFAULT_RETRY_BASE_DELAY_SECS,
            )?),
            call_timeout: Duration::from_secs(parse_or(
                &var,
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?),
            ..RetryPolicy::default()
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            assets_root,
            orders_root,
            replicate,
            face_service_url: required("FACE_SERVICE_URL")?,
            background_removal_url: var("BACKGROUND_REMOVAL_URL"),
            local_publish,
            s3,
            poll_interval: Duration::from_secs(parse_or(
                &var,
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            stale_after: Duration::from_secs(parse_or(
                &var,
                "STALE_ORDER_SECS",
                DEFAULT_STALE_AFTER.as_secs(),
            )?),
            max_order_attempts: parse_or(&var, "MAX_ORDER_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retry,
            download_timeout: Duration::from_secs(parse_or(
                &var,
                "DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )?),
            min_island_area: parse_or(&var, "MIN_ISLAND_AREA", DEFAULT_MIN_ISLAND_AREA)?,
            photo_quality: PhotoQuality {
                min_dimension: parse_or(&var, "MIN_PHOTO_DIMENSION", DEFAULT_MIN_PHOTO_DIMENSION)?,
                min_sharpness: parse_or(&var, "MIN_PHOTO_SHARPNESS", DEFAULT_MIN_SHARPNESS)?,
            },
            min_identity_similarity: parse_or(
                &var,
                "MIN_IDENTITY_SIMILARITY",
                DEFAULT_MIN_IDENTITY_SIMILARITY,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| env.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/pickabook"),
        ("REPLICATE_API_TOKEN", "r8_test"),
        ("FACE_SERVICE_URL", "http://faces:8001"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(&REQUIRED).unwrap();

        assert_eq!(config.assets_root, PathBuf::from("./assets"));
        assert_eq!(config.orders_root, PathBuf::from("./assets/orders"));
        assert_eq!(config.replicate.model, DEFAULT_MODEL);
        assert_eq!(config.replicate.api_url, "https://api.replicate.com");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stale_after, Duration::from_secs(1800));
        assert_eq!(config.max_order_attempts, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(5));
        assert_eq!(config.retry.call_timeout, Duration::from_secs(180));
        assert_eq!(config.download_timeout, Duration::from_secs(60));
        assert_eq!(config.min_island_area, 5000);
        assert_eq!(config.photo_quality, PhotoQuality::default());
        assert_eq!(config.min_identity_similarity, 0.3);
        assert!(config.background_removal_url.is_none());
        assert!(config.local_publish.is_none());
        assert!(config.s3.is_none());
    }

    #[test]
    fn missing_required_variable() {
        let err = load(&REQUIRED[..2]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("FACE_SERVICE_URL"));

        let mut blank = REQUIRED.to_vec();
        blank[0] = ("DATABASE_URL", "   ");
        assert_eq!(load(&blank).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn invalid_number_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_INTERVAL_SECS", "soon"));
        assert_matches!(
            load(&pairs),
            Err(ConfigError::Invalid { name: "POLL_INTERVAL_SECS", .. })
        );
    }

    #[test]
    fn quality_gate_can_be_disabled() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MIN_PHOTO_DIMENSION", "0"),
            ("MIN_PHOTO_SHARPNESS", "0"),
            ("DOWNLOAD_TIMEOUT_SECS", "15"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.photo_quality, PhotoQuality::disabled());
        assert_eq!(config.download_timeout, Duration::from_secs(15));
    }

    #[test]
    fn optional_publishers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("ASSETS_ROOT", "/srv/assets"),
            ("PUBLIC_DIR", "/srv/public"),
            ("PUBLIC_BASE_URL", "https://books.example/public"),
            ("S3_BUCKET", "pages"),
            ("S3_ENDPOINT", "http://minio:9000"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.orders_root, PathBuf::from("/srv/assets/orders"));
        assert_eq!(
            config.local_publish,
            Some(LocalPublish {
                public_dir: PathBuf::from("/srv/public"),
                base_url: "https://books.example/public".into(),
            })
        );
        let s3 = config.s3.unwrap();
        assert_eq!(s3.bucket, "pages");
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.endpoint.as_deref(), Some("http://minio:9000"));
    }

    #[test]
    fn half_configured_local_publish_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PUBLIC_DIR", "/srv/public"));
        assert_eq!(
            load(&pairs).unwrap_err(),
            ConfigError::Incomplete {
                present: "PUBLIC_DIR",
                missing: "PUBLIC_BASE_URL",
            }
        );
    }
}
