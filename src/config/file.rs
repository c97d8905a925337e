//! Configuration file loading.
//!
//! The file is TOML: one flat set of root keys plus reserved `[test]`,
//! `[development]` and `[production]` tables of the same shape. Which
//! section applies is decided by the already-resolved environment, and
//! section values override root values key by key.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::error::ConfigError;
use crate::config::options::Environment;
use crate::config::statics::RawStaticRoute;

/// One flat set of configuration keys, as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileSection {
    pub port: Option<u16>,
    pub local_hostname: Option<String>,

    pub http2: Option<bool>,
    pub http2_key: Option<String>,
    pub http2_cert: Option<String>,

    pub database: Option<bool>,
    pub db_type: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,

    pub session: Option<bool>,
    pub redis_host: Option<String>,
    pub session_cookie_domain: Option<String>,

    pub public_directory: Option<String>,
    pub statics: Option<Vec<RawStaticRoute>>,
}

/// Parsed configuration file: root keys plus per-environment sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(flatten)]
    pub root: FileSection,
    pub test: Option<FileSection>,
    pub development: Option<FileSection>,
    pub production: Option<FileSection>,
}

impl FileConfig {
    /// Load and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The override section for `environment`, when the file declares one.
    pub fn section(&self, environment: Environment) -> Option<&FileSection> {
        match environment {
            Environment::Test => self.test.as_ref(),
            Environment::Development => self.development.as_ref(),
            Environment::Production => self.production.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_parse_root_and_sections() {
        let file: FileConfig = toml::from_str(
            r#"
            port = 8080
            local-hostname = "example.org"
            session = true
            redis-host = "cache:6380"

            [development]
            port = 3001

            [test]
            database = true
            db-user = "tester"
            "#,
        )
        .unwrap();

        assert_eq!(file.root.port, Some(8080));
        assert_eq!(file.root.local_hostname.as_deref(), Some("example.org"));
        assert_eq!(file.root.session, Some(true));
        assert_eq!(file.root.redis_host.as_deref(), Some("cache:6380"));

        let dev = file.section(Environment::Development).unwrap();
        assert_eq!(dev.port, Some(3001));
        assert!(dev.local_hostname.is_none());

        let test = file.section(Environment::Test).unwrap();
        assert_eq!(test.database, Some(true));
        assert_eq!(test.db_user.as_deref(), Some("tester"));

        assert!(file.section(Environment::Production).is_none());
    }

    #[test]
    fn test_parse_statics() {
        let file: FileConfig = toml::from_str(
            r#"
            public-directory = "public"

            [[statics]]
            route = "/assets"
            serve = "static/assets"

            [[statics]]
            route = '/\/img/'
            serve = "static/img"
            "#,
        )
        .unwrap();

        assert_eq!(file.root.public_directory.as_deref(), Some("public"));
        let statics = file.root.statics.as_ref().unwrap();
        assert_eq!(statics.len(), 2);
        assert_eq!(statics[0].route, "/assets");
        assert_eq!(statics[1].route, r"/\/img/");
        assert_eq!(statics[1].serve, "static/img");
    }

    #[test]
    fn test_empty_document() {
        let file: FileConfig = toml::from_str("").unwrap();
        assert!(file.root.port.is_none());
        assert!(file.test.is_none());
        assert!(file.development.is_none());
        assert!(file.production.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/.vcms.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"port = [").unwrap();
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FileParse { .. }));
    }
}
