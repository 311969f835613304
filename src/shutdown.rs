use std::sync::Arc;

use tokio::signal;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

/// 守护模式的停止通知
///
/// 发送端在首次停止时被取走，之后订阅的接收器会立即收到通知。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.sender.lock().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 通知调度循环在当前触发完成后退出，重复调用无效果
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().await.take() else {
            debug!("调度循环已经收到过停止通知");
            return;
        };

        info!("通知调度循环停止");
        // 调度循环已退出时没有接收者
        let _ = sender.send(());
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("监听Ctrl+C失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("监听SIGTERM失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C"),
        _ = terminate => info!("收到SIGTERM"),
    }
}
