use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 备份时忽略的文件列表
///
/// 接受 JSON 数组（或对象，取其值）、换行或逗号分隔的文本，以及空串。
/// 非字符串与空白条目会被丢弃。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoredFiles(Vec<String>);

impl IgnoredFiles {
    pub fn new(files: Vec<String>) -> Self {
        Self(
            files
                .into_iter()
                .filter(|file| !file.trim().is_empty())
                .collect(),
        )
    }

    pub fn from_payload(payload: &str) -> Self {
        let payload = payload.trim();
        if payload.is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Array(items)) => Self::from_json_values(items),
            Ok(Value::Object(map)) => Self::from_json_values(map.into_iter().map(|(_, v)| v)),
            _ => Self::new(
                payload
                    .split(|c: char| matches!(c, '\r' | '\n' | ','))
                    .map(|part| part.trim().to_string())
                    .collect(),
            ),
        }
    }

    fn from_json_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(
            values
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        )
    }

    pub fn files(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 规范化后的 JSON 数组字符串，始终是合法的数组
    pub fn to_json(&self) -> String {
        Value::from(self.0.clone()).to_string()
    }
}
