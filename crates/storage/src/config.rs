use std::path::PathBuf;
use std::str::FromStr;

use imgproc_core::env;

use crate::error::BlobError;

/// Which [`BlobStore`](crate::BlobStore) backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    S3,
    Memory,
}

impl StorageKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for StorageKind {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => Err(BlobError::Config(format!(
                "Unknown storage type '{other}'. Must be one of: local, s3, memory"
            ))),
        }
    }
}

/// Connection settings for [`S3BlobStore`](crate::S3BlobStore).
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Custom endpoint (MinIO, LocalStack, ...). Enables path-style addressing.
    pub endpoint_url: Option<String>,
    /// Signing region. Defaults to `us-east-1` when unset.
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Key prefix inside the bucket, without leading or trailing slashes.
    pub prefix: String,
}

/// Blob storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub local_dir: PathBuf,
    pub s3: S3Config,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default           |
    /// |------------------------|-------------------|
    /// | `STORAGE_TYPE`         | `local`           |
    /// | `LOCAL_STORAGE_DIR`    | `./data/`         |
    /// | `S3_ENDPOINT_URL`      | unset             |
    /// | `S3_REGION`            | unset             |
    /// | `S3_ACCESS_KEY_ID`     | empty             |
    /// | `S3_SECRET_ACCESS_KEY` | empty             |
    /// | `S3_BUCKET`            | `image-processor` |
    /// | `S3_PREFIX`            | empty             |
    ///
    /// An unknown `STORAGE_TYPE` is a configuration error.
    pub fn from_env() -> Result<Self, BlobError> {
        let kind = env::var_or("STORAGE_TYPE", "local").parse()?;

        Ok(Self {
            kind,
            local_dir: PathBuf::from(env::var_or("LOCAL_STORAGE_DIR", "./data/")),
            s3: S3Config {
                endpoint_url: env::var_opt("S3_ENDPOINT_URL"),
                region: env::var_opt("S3_REGION"),
                access_key_id: env::var_or("S3_ACCESS_KEY_ID", ""),
                secret_access_key: env::var_or("S3_SECRET_ACCESS_KEY", ""),
                bucket: env::var_or("S3_BUCKET", "image-processor"),
                prefix: env::var_or("S3_PREFIX", "").trim_matches('/').to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_kind_parses_case_insensitively() {
        assert_eq!("LOCAL".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!(" s3 ".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
    }

    #[test]
    fn storage_kind_rejects_unknown() {
        assert!("gcs".parse::<StorageKind>().is_err());
    }
}
