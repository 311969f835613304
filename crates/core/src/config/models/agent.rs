use serde::{Deserialize, Serialize};

/// Remote agent client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub verify_tls: bool,
    /// Storage adapter requested for scheduled backups
    pub backup_adapter: String,
    pub user_agent: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            verify_tls: true,
            backup_adapter: "wings".to_string(),
            user_agent: format!("fleet-scheduler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("代理请求超时时间必须大于0"));
        }

        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("代理连接超时时间必须大于0"));
        }

        if self.connect_timeout_seconds > self.request_timeout_seconds {
            return Err(anyhow::anyhow!("代理连接超时时间不能大于请求超时时间"));
        }

        if self.backup_adapter.trim().is_empty() {
            return Err(anyhow::anyhow!("备份适配器不能为空"));
        }

        Ok(())
    }
}
