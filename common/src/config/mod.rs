use std::path::PathBuf;

use getset::{CopyGetters, Getters, Setters};
use serde::{Deserialize, Serialize};

/// Checkpoint flush pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushPaceMode {
    /// 写入活跃时放弃本次checkpoint
    IdleOnly,
    /// 写入活跃时降速，但不中断
    PauseIfActivity,
    /// shutdown路径: 不降速不中断
    NoPause,
}

impl Default for FlushPaceMode {
    fn default() -> Self {
        FlushPaceMode::PauseIfActivity
    }
}

/// Recovery progress reporting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryProgress {
    Off,
    /// 打印百分比与完成行
    Summary,
    /// Summary, 加上每条日志记录一行
    Full,
}

impl Default for RecoveryProgress {
    fn default() -> Self {
        RecoveryProgress::Summary
    }
}

/// 引擎可配项
#[derive(Debug, Clone, Getters, CopyGetters, Setters, Serialize, Deserialize)]
pub struct XtConfig {
    // 数据库根目录
    #[getset(get = "pub", set = "pub")]
    db_path: String,

    // 单个xlog文件最大值（字节）
    #[getset(get_copy = "pub", set = "pub")]
    log_file_threshold: u64,

    // 两次checkpoint之间的写入量（字节）
    #[getset(get_copy = "pub", set = "pub")]
    checkpoint_frequency: u64,

    // xlog写缓冲大小
    #[getset(get_copy = "pub", set = "pub")]
    log_buffer_size: usize,

    // checkpoint后保留的历史日志文件数
    #[getset(get_copy = "pub", set = "pub")]
    min_log_files_to_keep: u32,

    // checkpoint刷盘节奏
    #[getset(get_copy = "pub", set = "pub")]
    flush_pace_mode: FlushPaceMode,

    // 打开表句柄缓存上限
    #[getset(get_copy = "pub", set = "pub")]
    max_open_tables: usize,

    // 恢复进度打印
    #[getset(get_copy = "pub", set = "pub")]
    recovery_print_progress: RecoveryProgress,
}

impl Default for XtConfig {
    fn default() -> Self {
        Self {
            db_path: "".to_string(),
            // 32M
            log_file_threshold: 32 * 1024 * 1024,
            // 4M
            checkpoint_frequency: 4 * 1024 * 1024,
            // 256k
            log_buffer_size: 256 * 1024,
            min_log_files_to_keep: 0,
            flush_pace_mode: FlushPaceMode::default(),
            max_open_tables: 64,
            recovery_print_progress: RecoveryProgress::default(),
        }
    }
}

impl XtConfig {
    pub fn with_db_path(db_path: &str) -> Self {
        let mut c = Self::default();
        c.db_path = db_path.to_string();
        c
    }

    /// `<db>/system` 目录: restart-1.xt / restart-2.xt
    pub fn system_dir(&self) -> PathBuf {
        PathBuf::from(&self.db_path).join("system")
    }

    /// `<db>/xlog` 目录: `<log_id>.xtl`
    pub fn xlog_dir(&self) -> PathBuf {
        PathBuf::from(&self.db_path).join("xlog")
    }

    /// `<db>/dlog` 目录: `<data_log_id>.xtd`
    pub fn dlog_dir(&self) -> PathBuf {
        PathBuf::from(&self.db_path).join("dlog")
    }

    /// `<db>/tables` 目录: `<tab_id>.xtr/.xtd/.xti`
    pub fn tables_dir(&self) -> PathBuf {
        PathBuf::from(&self.db_path).join("tables")
    }
}
