//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 输入文件无法打开
    #[error("failed to open input {path}: {source}")]
    Open {
        /// 文件路径
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 读取输入失败
    #[error("failed to read from source {source_id}: {source}")]
    Read {
        /// 数据源 ID
        source_id: String,
        #[source]
        source: std::io::Error,
    },

    /// 数据源已启动过
    #[error("source {source_id} was already started")]
    AlreadyStarted {
        /// 数据源 ID
        source_id: String,
    },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
