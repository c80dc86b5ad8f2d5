//! Configuration loading (`spec.md` §6 "Configuration keys consumed").
//!
//! `spec.md` treats configuration loading as an external collaborator; this concrete
//! `Config` struct and its `serde` + `toml` loader are the ambient stack that makes the
//! rest of the crate runnable, in the style the example pack's `serde`-derived configs
//! use (`construct-core`'s workspace `serde` dependency, `TritonDataCenter`'s services).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The three legacy SSH-1 bulk ciphers this crate negotiates, in the sentinel-aware
/// preference-list vocabulary `spec.md` §4.6 "Cipher negotiation" describes (`Warn` is
/// a marker, not a cipher; `Aes` is accepted in the list but always skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherPref {
    TripleDes,
    Blowfish,
    Des,
    Aes,
    Warn,
}

/// Remote-server bug quirks that change the password-send strategy
/// (`spec.md` §4.6 "Password").
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RemoteBugMask {
    #[serde(default)]
    pub chokes_on_ssh1_ignore: bool,
    #[serde(default)]
    pub needs_ssh1_plain_password: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cipher_preference: Vec<CipherPref>,
    pub keyfile: Option<PathBuf>,
    pub try_agent: bool,
    pub try_tis: bool,
    pub try_cryptocard: bool,
    pub remote_user: Option<String>,
    pub compression: bool,
    pub remote_bugs: RemoteBugMask,
    pub agent_socket_path: PathBuf,
    pub agent_is_local: bool,
    /// Manually pinned SSH-1 host keys consulted before falling back to the
    /// interactive host-key dialog (`spec.md` §4.6 "ask the configuration first for a
    /// manual-host-key list"). `None` means host-key pinning was never configured.
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cipher_preference: vec![CipherPref::TripleDes, CipherPref::Blowfish, CipherPref::Des],
            keyfile: None,
            try_agent: true,
            try_tis: false,
            try_cryptocard: false,
            remote_user: None,
            compression: false,
            remote_bugs: RemoteBugMask::default(),
            agent_socket_path: PathBuf::from("/tmp/sshagent.sock"),
            agent_is_local: true,
            known_hosts_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults for any field the
    /// file omits (`#[serde(default)]` on `Config` and `RemoteBugMask`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.try_agent);
        assert_eq!(config.cipher_preference.len(), 3);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_text = r#"
            try_tis = true
            [remote_bugs]
            needs_ssh1_plain_password = true
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert!(config.try_tis);
        assert!(config.try_agent);
        assert!(config.remote_bugs.needs_ssh1_plain_password);
    }
}
