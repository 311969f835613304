//! Test data builders for creating test entities
//!
//! Sensible defaults with easy customization. Defaults describe an online
//! server on node 1 with a schedule that is already due.

use chrono::{DateTime, Duration, Utc};
use scheduler_domain::entities::{Backup, CronFields, Node, Schedule, Server, Task};

/// Builder for creating test Schedule entities
pub struct ScheduleBuilder {
    schedule: Schedule,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            schedule: Schedule {
                id: 1,
                server_id: 1,
                name: "test_schedule".to_string(),
                cron: CronFields::new("0", "3", "*", "*", "*"),
                is_active: true,
                is_processing: false,
                only_when_online: false,
                next_run_at: Some(now - Duration::minutes(1)),
                last_run_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.schedule.id = id;
        self
    }

    pub fn with_server_id(mut self, server_id: i64) -> Self {
        self.schedule.server_id = server_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.schedule.name = name.to_string();
        self
    }

    /// Five whitespace separated fields, e.g. `"*/5 * * * *"`
    pub fn with_cron(mut self, expression: &str) -> Self {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        assert_eq!(fields.len(), 5, "cron expression needs five fields: {expression}");
        self.schedule.cron = CronFields::new(fields[0], fields[1], fields[2], fields[3], fields[4]);
        self
    }

    pub fn with_next_run_at(mut self, next_run_at: Option<DateTime<Utc>>) -> Self {
        self.schedule.next_run_at = next_run_at;
        self
    }

    pub fn due_at(self, at: DateTime<Utc>) -> Self {
        self.with_next_run_at(Some(at))
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.schedule.updated_at = updated_at;
        self
    }

    pub fn processing(mut self) -> Self {
        self.schedule.is_processing = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.schedule.is_active = false;
        self
    }

    pub fn only_when_online(mut self) -> Self {
        self.schedule.only_when_online = true;
        self
    }

    pub fn build(self) -> Schedule {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task {
                id: 1,
                schedule_id: 1,
                sequence_id: 1,
                action: "command".to_string(),
                payload: Some("say hello".to_string()),
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_schedule_id(mut self, schedule_id: i64) -> Self {
        self.task.schedule_id = schedule_id;
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: i32) -> Self {
        self.task.sequence_id = sequence_id;
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.task.action = action.to_string();
        self
    }

    pub fn with_payload(mut self, payload: &str) -> Self {
        self.task.payload = Some(payload.to_string());
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.task.payload = None;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Server entities
pub struct ServerBuilder {
    server: Server,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            server: Server {
                id: 1,
                uuid: "1a7ce997-259b-452e-8b4e-cecc464142ca".to_string(),
                name: "test_server".to_string(),
                node_id: 1,
                status: Some(Server::ONLINE_STATUS.to_string()),
                backup_limit: 0,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.server.id = id;
        self
    }

    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.server.uuid = uuid.to_string();
        self
    }

    pub fn with_node_id(mut self, node_id: i64) -> Self {
        self.server.node_id = node_id;
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.server.status = Some(status.to_string());
        self
    }

    pub fn offline(self) -> Self {
        self.with_status("offline")
    }

    pub fn without_status(mut self) -> Self {
        self.server.status = None;
        self
    }

    pub fn with_backup_limit(mut self, backup_limit: i32) -> Self {
        self.server.backup_limit = backup_limit;
        self
    }

    pub fn build(self) -> Server {
        self.server
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Node entities
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            node: Node {
                id: 1,
                name: "test_node".to_string(),
                fqdn: "node1.example.com".to_string(),
                scheme: "https".to_string(),
                daemon_listen: 8080,
                daemon_token: "test-daemon-token".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.node.id = id;
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.node.daemon_token = token.to_string();
        self
    }

    /// Point the node at a URL such as `http://127.0.0.1:41234`
    pub fn with_base_url(mut self, url: &str) -> Self {
        let (scheme, rest) = url.split_once("://").expect("base url needs a scheme");
        let (host, port) = rest
            .trim_end_matches('/')
            .rsplit_once(':')
            .expect("base url needs a port");
        self.node.scheme = scheme.to_string();
        self.node.fqdn = host.to_string();
        self.node.daemon_listen = port.parse().expect("base url port must be numeric");
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Backup entities
pub struct BackupBuilder {
    backup: Backup,
}

impl BackupBuilder {
    pub fn new() -> Self {
        Self {
            backup: Backup {
                id: 1,
                server_id: 1,
                uuid: "b0a3f2d4-6a43-4a89-9d5b-2f0c7e1d9a11".to_string(),
                name: "existing backup".to_string(),
                ignored_files: "[]".to_string(),
                disk: "wings".to_string(),
                is_successful: true,
                is_locked: false,
                created_at: Utc::now(),
                deleted_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.backup.id = id;
        self.backup.uuid = format!("b0a3f2d4-6a43-4a89-9d5b-{id:012}");
        self
    }

    pub fn with_server_id(mut self, server_id: i64) -> Self {
        self.backup.server_id = server_id;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.backup.deleted_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> Backup {
        self.backup
    }
}

impl Default for BackupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
