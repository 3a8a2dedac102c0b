//! 配置模块，负责加载JSON配置文件

use crate::joins::{ForeignKey, ForeignKeyProvider};
use crate::sql_compiler::Dialect;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// 配置加载错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(String),
    #[error("无法读取配置文件 {path}: {message}")]
    Read { path: String, message: String },
    #[error("无法解析JSON配置文件 {path}: {message}")]
    Parse { path: String, message: String },
}

/// 读取并反序列化一个JSON文件
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    // 检查文件是否存在
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// 外键元数据：表名 -> 字段名 -> 外键描述
///
/// ```json
/// {
///   "sale_order": {
///     "partner_id": {"foreign_table_name": "res_partner", "column_name": "partner_id", "foreign_column_name": "id"}
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyConfig {
    #[serde(flatten)]
    pub tables: HashMap<String, HashMap<String, ForeignKey>>,
}

impl ForeignKeyConfig {
    /// 从JSON文件加载外键配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load_json(path.as_ref())?;
        tracing::debug!(
            path = %path.as_ref().display(),
            tables = config.tables.len(),
            "loaded foreign keys"
        );
        Ok(config)
    }

    /// 登记一个外键（REPL 的 `:fk` 命令使用）
    pub fn insert(&mut self, table: impl Into<String>, field: impl Into<String>, fk: ForeignKey) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(field.into(), fk);
    }

    /// 外键总数
    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ForeignKeyProvider for ForeignKeyConfig {
    fn foreign_key(&self, table: &str, field: &str) -> Option<ForeignKey> {
        self.tables.get(table)?.get(field).cloned()
    }
}

/// 编译器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 输出 SQL 的方言
    pub dialect: Dialect,
    /// 查询的根表
    pub root_table: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            root_table: "table".to_string(),
        }
    }
}

impl CompilerConfig {
    /// 从JSON文件加载编译器配置，缺省字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }
}
