//! # 领域服务
//!
//! 不属于单个实体、被多个组件共享的业务逻辑。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entities::{ActivityEvent, NewActivity, Server};
use crate::repositories::ActivityRepository;

/// 服务器活动日志记录器
///
/// 写入失败只记录警告，不会中断调度流程。
#[derive(Clone)]
pub struct ActivityRecorder {
    repository: Arc<dyn ActivityRepository>,
}

impl ActivityRecorder {
    pub fn new(repository: Arc<dyn ActivityRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(&self, server: &Server, event: ActivityEvent, metadata: serde_json::Value) {
        let activity = NewActivity {
            server_id: server.id,
            node_id: server.node_id,
            event,
            metadata,
        };

        match self.repository.create_activity(&activity).await {
            Ok(id) => debug!("记录服务器 {} 活动 {} (ID: {})", server.id, event, id),
            Err(e) => warn!("记录服务器 {} 活动 {} 失败: {}", server.id, event, e),
        }
    }
}
