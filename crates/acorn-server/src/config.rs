//! Server configuration loaded from environment variables.

use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the server listens on.
    pub listen_port: u16,
    /// Directory holding the block file and header sidecar.
    pub data_dir: PathBuf,
    /// Word list loaded into a freshly created store, one key per line.
    pub words_file: PathBuf,
}

impl ServerConfig {
    /// Loads the configuration from environment variables, falling back to
    /// defaults for any that are unset.
    ///
    /// - `ACORN_LISTEN_PORT`: listen port (default: 2333)
    /// - `ACORN_DATA_DIR`: data directory (default: "./data")
    /// - `ACORN_WORDS_FILE`: bootstrap word list (default: "./words.txt")
    pub fn from_env() -> Self {
        Self::from_env_reader(|key| std::env::var(key))
    }

    /// Loads the configuration through a custom environment reader, which
    /// keeps the parsing testable.
    pub fn from_env_reader<F, E>(env_reader: F) -> Self
    where
        F: Fn(&str) -> Result<String, E>,
    {
        let listen_port = env_reader("ACORN_LISTEN_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2333);

        let data_dir = env_reader("ACORN_DATA_DIR")
            .map_or_else(|_| PathBuf::from("./data"), PathBuf::from);

        let words_file = env_reader("ACORN_WORDS_FILE")
            .map_or_else(|_| PathBuf::from("./words.txt"), PathBuf::from);

        Self {
            listen_port,
            data_dir,
            words_file,
        }
    }

    /// Path of the block file inside the data directory.
    pub fn block_file_path(&self) -> PathBuf {
        self.data_dir.join("words.flraf")
    }

    /// Path of the header sidecar inside the data directory.
    pub fn header_path(&self) -> PathBuf {
        self.data_dir.join("words.hdr")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config =
            ServerConfig::from_env_reader(|_| Err::<String, std::env::VarError>(std::env::VarError::NotPresent));

        assert_eq!(config.listen_port, 2333);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.words_file, PathBuf::from("./words.txt"));
    }

    #[test]
    fn test_reads_environment_values() {
        let config = ServerConfig::from_env_reader(|key| match key {
            "ACORN_LISTEN_PORT" => Ok("8080".to_string()),
            "ACORN_DATA_DIR" => Ok("/var/lib/acorn".to_string()),
            "ACORN_WORDS_FILE" => Ok("/usr/share/dict/words".to_string()),
            _ => Err(std::env::VarError::NotPresent),
        });

        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/acorn"));
        assert_eq!(config.words_file, PathBuf::from("/usr/share/dict/words"));
    }

    #[test]
    fn test_unparseable_port_falls_back_to_default() {
        let config = ServerConfig::from_env_reader(|key| match key {
            "ACORN_LISTEN_PORT" => Ok("not-a-port".to_string()),
            _ => Err(std::env::VarError::NotPresent),
        });

        assert_eq!(config.listen_port, 2333);
    }

    #[test]
    fn test_derived_paths() {
        let config = ServerConfig::from_env_reader(|key| match key {
            "ACORN_DATA_DIR" => Ok("/tmp/store".to_string()),
            _ => Err(std::env::VarError::NotPresent),
        });

        assert_eq!(config.block_file_path(), PathBuf::from("/tmp/store/words.flraf"));
        assert_eq!(config.header_path(), PathBuf::from("/tmp/store/words.hdr"));
    }
}
