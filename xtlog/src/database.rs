use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::info;

use common::config::XtConfig;
use common::err::XResult;

use crate::checkpoint::CheckPointState;
use crate::data_log::DataLogManager;
use crate::op_seq;
use crate::record::LogRecord;
use crate::recovery::{self, RestartState};
use crate::table_pool::TablePool;
use crate::xact::XactStore;
use crate::xlog::{LogPos, XlogWriter};

/////////////////////////////////////
/// Database
///
/// 进程级上下文: 一个有序xlog + 表池 + 事务表 + 数据日志 +
/// checkpoint状态。 init于启动 (恢复完成后), drain于停机。
///
/// 锁次序: cp_state -> xlog -> tables -> data_logs。
/////////////////////////////////////
pub struct Database {
    pub config: XtConfig,
    pub xlog: Mutex<XlogWriter>,
    pub tables: Mutex<TablePool>,
    pub xacts: XactStore,
    pub data_logs: Mutex<DataLogManager>,
    pub restart: Mutex<RestartState>,
    pub cp_state: Mutex<CheckPointState>,
    pub cp_wake: Condvar,

    db_curr_tab_id: AtomicU32,
    cp_requested: AtomicBool,
    quit: AtomicBool,
    /// 致命错误后只读排空模式
    read_only: AtomicBool,
}

/// 恢复结果摘要
#[derive(Debug, Clone, Copy)]
pub struct RecoverySummary {
    pub end_pos: LogPos,
    pub bytes_read: u64,
    pub tail_corrupt: bool,
}

impl Database {
    /// 打开数据库: 读restart槽, 回放xlog, 在恢复末尾打开writer。
    pub fn open(config: XtConfig) -> XResult<(Arc<Database>, RecoverySummary)> {
        fs::create_dir_all(config.system_dir())?;
        fs::create_dir_all(config.xlog_dir())?;
        fs::create_dir_all(config.dlog_dir())?;
        fs::create_dir_all(config.tables_dir())?;

        let mut restart = RestartState::init(&config)?;
        // 胜者checkpoint列出的待退休xlog文件还在盘上,
        // 留给下一次checkpoint的retire处理 (restart.pending_log_retire)。
        let mut data_logs = DataLogManager::open(&config)?;

        let mut tables = TablePool::new(&config.tables_dir(), config.max_open_tables());
        let xacts = XactStore::new();

        let outcome = recovery::recover(&config, &mut restart, &mut tables, &xacts, &mut data_logs)?;

        let xlog = XlogWriter::open(&config, outcome.end_pos)?;

        let db = Arc::new(Database {
            db_curr_tab_id: AtomicU32::new(restart.max_tab_id),
            config,
            xlog: Mutex::new(xlog),
            tables: Mutex::new(tables),
            xacts,
            data_logs: Mutex::new(data_logs),
            restart: Mutex::new(restart),
            cp_state: Mutex::new(CheckPointState::new()),
            cp_wake: Condvar::new(),
            cp_requested: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
        });

        let summary = RecoverySummary {
            end_pos: outcome.end_pos,
            bytes_read: outcome.bytes_read,
            tail_corrupt: outcome.tail_corrupt,
        };
        Ok((db, summary))
    }

    /// 追加一条日志记录 (writer monitor下)。
    pub fn write_record(&self, record: &LogRecord) -> XResult<LogPos> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(common::err::engine_error::XtError::Busy(
                "engine is draining after a fatal error.".to_string()));
        }
        let mut xlog = self.xlog.lock().unwrap();
        let pos = xlog.write(record)?;

        // 事务簿记跟着写路径走
        match record {
            LogRecord::Mutation { kind, xact_id, .. } => {
                if kind.is_bg() {
                    self.xacts.materialize_bg(*xact_id, pos);
                } else {
                    self.xacts.begin(*xact_id, pos);
                }
            }
            LogRecord::Commit { xact_id } => self.xacts.mark_ended(*xact_id, true),
            LogRecord::Abort { xact_id } => self.xacts.mark_ended(*xact_id, false),
            LogRecord::Cleanup { xact_id } => self.xacts.cleanup(*xact_id),
            LogRecord::NewTab { tab_id } => {
                self.note_tab_id(*tab_id);
            }
            _ => {}
        }
        Ok(pos)
    }

    /// 把已写入的记录应用到表 (writer线程路径, 与恢复共用applier)。
    pub fn apply_record(&self, record: &LogRecord, pos: LogPos) -> XResult<()> {
        let ind_rec_pos = {
            let restart = self.restart.lock().unwrap();
            restart.ind_rec_pos
        };
        let mut tables = self.tables.lock().unwrap();
        let mut data_logs = self.data_logs.lock().unwrap();
        match record {
            LogRecord::NewTab { tab_id } => {
                tables.create(*tab_id)?;
                self.note_tab_id(*tab_id);
                Ok(())
            }
            _ => recovery::apply_in_order(
                &mut tables, &self.xacts, &mut data_logs,
                ind_rec_pos, record, pos, false),
        }
    }

    pub fn note_tab_id(&self, tab_id: u32) {
        let mut cur = self.db_curr_tab_id.load(Ordering::SeqCst);
        while tab_id > cur {
            match self.db_curr_tab_id.compare_exchange(cur, tab_id, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(now) => cur = now,
            }
        }
    }

    pub fn curr_tab_id(&self) -> u32 {
        self.db_curr_tab_id.load(Ordering::SeqCst)
    }

    /// 自上次checkpoint以来的写入量 (按阈值估算跨文件部分)
    pub fn bytes_since_checkpoint(&self) -> u64 {
        let (cp_pos, threshold) = {
            let restart = self.restart.lock().unwrap();
            (restart.cp_pos, self.config.log_file_threshold())
        };
        let head = self.xlog.lock().unwrap().write_head();

        if cp_pos.log_id < head.log_id {
            let mut bytes = threshold.saturating_sub(cp_pos.offset);
            bytes += (head.log_id - cp_pos.log_id - 1) as u64 * threshold;
            bytes += head.offset;
            bytes
        } else {
            head.offset.saturating_sub(cp_pos.offset)
        }
    }

    /// 显式请求checkpoint (admin/shutdown路径), 唤醒checkpointer
    pub fn request_checkpoint(&self) {
        self.cp_requested.store(true, Ordering::SeqCst);
        self.cp_wake.notify_all();
    }

    pub fn take_checkpoint_request(&self) -> bool {
        self.cp_requested.swap(false, Ordering::SeqCst)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        self.cp_wake.notify_all();
    }

    /// 致命错误: 转入只读排空
    pub fn enter_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
        info!("engine entering read-only drain mode.");
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// 回绕安全的最大事务id (checkpoint写盘用)
    pub fn max_xact_id(&self) -> u32 {
        let from_store = self.xacts.max_id();
        let from_restart = self.restart.lock().unwrap().max_xact_id;
        if from_store == 0 {
            from_restart
        } else {
            op_seq::max_seq(from_store, from_restart)
        }
    }
}
