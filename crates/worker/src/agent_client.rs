//! 远程代理的HTTP客户端
//!
//! 每个节点一个客户端，请求携带节点令牌。所有失败（包括超时与连接错误）
//! 都以失败响应返回，不会向调用方抛出传输错误。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use scheduler_core::{AgentConfig, SchedulerError, SchedulerResult};
use scheduler_domain::{AgentClient, AgentClientFactory, AgentResponse, Node, PowerAction};
use scheduler_infrastructure::MetricsCollector;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// 基于 reqwest 的代理客户端
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
    token: String,
    metrics: Arc<MetricsCollector>,
}

impl HttpAgentClient {
    pub fn new(
        node: &Node,
        config: &AgentConfig,
        metrics: Arc<MetricsCollector>,
    ) -> SchedulerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                SchedulerError::AgentUnavailable(format!("创建节点 {} 的HTTP客户端失败: {e}", node.id))
            })?;

        Ok(Self {
            client,
            base_url: node.base_url(),
            token: node.daemon_token.clone(),
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, operation: &'static str, path: &str, body: Option<Value>) -> AgentResponse {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => Self::read_response(response).await,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("请求代理超时: {url}")
                } else {
                    format!("请求代理失败: {e}")
                };
                AgentResponse::failure(0, message)
            }
        };

        self.metrics.record_agent_request(
            operation,
            response.is_successful(),
            started.elapsed().as_secs_f64(),
        );

        if response.is_successful() {
            debug!("代理请求成功: POST {} ({})", url, response.status);
        } else {
            warn!("代理请求失败: POST {} - {}", url, response.error());
        }
        response
    }

    async fn read_response(response: reqwest::Response) -> AgentResponse {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_client_error() || status.is_server_error() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status_message(status));
            return AgentResponse::failure(status.as_u16(), message);
        }

        AgentResponse::success(status.as_u16(), body)
    }
}

fn status_message(status: StatusCode) -> String {
    format!(
        "代理返回HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn power(&self, server_uuid: &str, action: PowerAction) -> AgentResponse {
        let body = json!({
            "action": action.as_str(),
            "wait_seconds": action.wait_seconds(),
        });
        self.post("power", &format!("/api/servers/{server_uuid}/power"), Some(body))
            .await
    }

    async fn send_commands(&self, server_uuid: &str, commands: &[String]) -> AgentResponse {
        let body = json!({ "commands": commands });
        self.post("commands", &format!("/api/servers/{server_uuid}/commands"), Some(body))
            .await
    }

    async fn install_server(&self, server_uuid: &str) -> AgentResponse {
        self.post("install", &format!("/api/servers/{server_uuid}/install"), None)
            .await
    }

    async fn reinstall_server(&self, server_uuid: &str) -> AgentResponse {
        self.post("reinstall", &format!("/api/servers/{server_uuid}/reinstall"), None)
            .await
    }

    async fn create_backup(
        &self,
        server_uuid: &str,
        adapter: &str,
        backup_uuid: &str,
        ignored_files_json: &str,
    ) -> AgentResponse {
        let ignore: Value =
            serde_json::from_str(ignored_files_json).unwrap_or_else(|_| Value::Array(Vec::new()));
        let body = json!({
            "adapter": adapter,
            "uuid": backup_uuid,
            "ignore": ignore,
        });
        self.post("backup", &format!("/api/servers/{server_uuid}/backup"), Some(body))
            .await
    }
}

/// 按节点构建 [`HttpAgentClient`]
pub struct HttpAgentClientFactory {
    config: AgentConfig,
    metrics: Arc<MetricsCollector>,
}

impl HttpAgentClientFactory {
    pub fn new(config: AgentConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self { config, metrics }
    }
}

impl AgentClientFactory for HttpAgentClientFactory {
    fn connect(&self, node: &Node) -> SchedulerResult<Arc<dyn AgentClient>> {
        let client = HttpAgentClient::new(node, &self.config, self.metrics.clone())?;
        Ok(Arc::new(client))
    }
}
