use std::path::PathBuf;
use thiserror::Error;

/// 打包流程中各环节共用的结果类型
pub type Result<T> = std::result::Result<T, PackError>;

/// 打包工具的错误类型
#[derive(Error, Debug)]
pub enum PackError {
    /// 没有选择入口脚本，无法生成命令
    #[error("请选择要打包的 Python 文件")]
    MissingScript,

    /// 额外参数中的引号不配对
    #[error("额外参数中的引号不配对: {line}")]
    ExtraArgs { line: String },

    #[error("无法读取配置文件 {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析配置文件 {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("无法写入配置文件 {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法序列化配置: {0}")]
    ConfigSerialize(#[source] serde_json::Error),

    /// 子进程启动失败（程序不存在、无执行权限等）
    #[error("无法启动 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("等待进程结束失败: {0}")]
    Wait(#[source] std::io::Error),

    #[error("{program} 在 {seconds} 秒内没有响应")]
    Timeout { program: String, seconds: u64 },
}
