use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub src: Endpoint,
    pub dst: Endpoint,
    #[serde(default)]
    pub filters: Filters,
}

/// One side of the bridge: a job server address, a queue name, and an
/// optional encryption key. No key means payloads flow through that side
/// as plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub server: String,
    pub queue: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub host_name: Option<String>,
}

impl Endpoint {
    /// The encryption key for this side, if one is configured. An empty
    /// key string behaves like no key at all: that side stays plaintext.
    pub fn cipher_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    fn validate(&self, side: &str) -> anyhow::Result<()> {
        if self.server.trim().is_empty() {
            anyhow::bail!("{side}: server address must not be empty");
        }
        if self.queue.trim().is_empty() {
            anyhow::bail!("{side}: queue name must not be empty");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            src: Endpoint {
                server: "127.0.0.1:4730".to_string(),
                queue: "results_in".to_string(),
                key: Some("should-be-changed".to_string()),
            },
            dst: Endpoint {
                server: "127.0.0.1:4731".to_string(),
                queue: "results_out".to_string(),
                key: None,
            },
            filters: Filters {
                host_name: Some("^web".to_string()),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.src.validate("src")?;
        self.dst.validate("dst")?;
        Ok(())
    }
}
