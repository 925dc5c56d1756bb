use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{error, info, warn};

use common::checksum::checksum_2;
use common::config::FlushPaceMode;
use common::err::engine_error::XtError;
use common::err::XResult;

use crate::database::Database;
use crate::recovery::RestartState;
use crate::xlog::{self, LogPos};

pub const CHECKPOINT_VERSION: u16 = 1;
/// checkpointer空转等待
pub const CHECKPOINTER_POLL_MS: u64 = 400;

/// 表flush进度位
pub const REC_ROW_FLUSHED: u8 = 0x01;
pub const INDEX_FLUSHED: u8 = 0x02;

/////////////////////////////////////
/// Checkpoint文件 (restart槽) 格式:
///
/// ```txt
/// head_size          u32
/// checksum           u16   // 对[2..head_size)字节, checksum槽清零计算
/// version            u16
/// checkpoint_no      u48
/// restart_log_id     u32
/// restart_log_off    u48
/// max_table_id       u32
/// max_xact_id        u32
/// ind_rec_log_id     u32
/// ind_rec_log_off    u48
/// deleted_log_count  u16
/// deleted_log_ids    u16 * count
/// ```
/////////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub checkpoint_no: u64,
    pub restart_pos: LogPos,
    pub max_table_id: u32,
    pub max_xact_id: u32,
    pub ind_rec_pos: LogPos,
    pub deleted_log_ids: Vec<u16>,
}

impl CheckpointRecord {
    pub fn encode(&self) -> XResult<Vec<u8>> {
        let head_size = 44 + self.deleted_log_ids.len() * 2;
        let mut buf: Vec<u8> = Vec::with_capacity(head_size);
        buf.write_u32::<LittleEndian>(head_size as u32)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(CHECKPOINT_VERSION)?;
        buf.write_uint::<LittleEndian>(self.checkpoint_no, 6)?;
        buf.write_u32::<LittleEndian>(self.restart_pos.log_id)?;
        buf.write_uint::<LittleEndian>(self.restart_pos.offset, 6)?;
        buf.write_u32::<LittleEndian>(self.max_table_id)?;
        buf.write_u32::<LittleEndian>(self.max_xact_id)?;
        buf.write_u32::<LittleEndian>(self.ind_rec_pos.log_id)?;
        buf.write_uint::<LittleEndian>(self.ind_rec_pos.offset, 6)?;
        buf.write_u16::<LittleEndian>(self.deleted_log_ids.len() as u16)?;
        for id in &self.deleted_log_ids {
            buf.write_u16::<LittleEndian>(*id)?;
        }
        let ck = checksum_2(&buf[2..], 1);
        buf[4] = (ck & 0xFF) as u8;
        buf[5] = (ck >> 8) as u8;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Option<CheckpointRecord> {
        if buf.len() < 44 {
            return None;
        }
        let head_size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if head_size < 44 || head_size > buf.len() {
            return None;
        }
        let stored_ck = u16::from_le_bytes([buf[4], buf[5]]);
        let mut copy = buf[..head_size].to_vec();
        copy[4] = 0;
        copy[5] = 0;
        if checksum_2(&copy[2..], 1) != stored_ck {
            return None;
        }

        let mut cur = std::io::Cursor::new(&buf[6..head_size]);
        let version = cur.read_u16::<LittleEndian>().ok()?;
        if version != CHECKPOINT_VERSION {
            return None;
        }
        let checkpoint_no = cur.read_uint::<LittleEndian>(6).ok()?;
        let restart_log_id = cur.read_u32::<LittleEndian>().ok()?;
        let restart_log_off = cur.read_uint::<LittleEndian>(6).ok()?;
        let max_table_id = cur.read_u32::<LittleEndian>().ok()?;
        let max_xact_id = cur.read_u32::<LittleEndian>().ok()?;
        let ind_log_id = cur.read_u32::<LittleEndian>().ok()?;
        let ind_log_off = cur.read_uint::<LittleEndian>(6).ok()?;
        let count = cur.read_u16::<LittleEndian>().ok()? as usize;
        let mut deleted_log_ids = Vec::with_capacity(count);
        for _ in 0..count {
            deleted_log_ids.push(cur.read_u16::<LittleEndian>().ok()?);
        }
        Some(CheckpointRecord {
            checkpoint_no,
            restart_pos: LogPos::new(restart_log_id, restart_log_off),
            max_table_id,
            max_xact_id,
            ind_rec_pos: LogPos::new(ind_log_id, ind_log_off),
            deleted_log_ids,
        })
    }

    /// 写restart槽: 截断、写入、fsync
    pub fn write_to_file(&self, path: &Path) -> XResult<()> {
        let buf = self.encode()?;
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// 读restart槽。 缺失/checksum不符/版本不符都返回None。
    pub fn read_from_file(path: &Path) -> XResult<Option<CheckpointRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let rec = Self::decode(&buf);
        if rec.is_none() {
            warn!("restart slot {:?} did not verify.", path);
        }
        Ok(rec)
    }
}

/// checkpoint循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPhase {
    Idle,
    Collecting,
    Flushing,
    Writing,
    Retiring,
}

#[derive(Debug, Clone)]
pub struct CheckpointTable {
    pub tab_id: u32,
    pub flushed: u8,
}

pub struct CheckPointState {
    pub phase: CheckpointPhase,
    pub running: bool,
    pub restart_pos: LogPos,
    pub ind_rec_pos: LogPos,
    /// collect时的writer head, IDLE_ONLY模式的活动探测基准
    pub start_write_head: LogPos,
    pub flush_set: Vec<CheckpointTable>,
    pub next_to_flush: usize,
    pub flush_count: usize,
}

impl CheckPointState {
    pub fn new() -> Self {
        Self {
            phase: CheckpointPhase::Idle,
            running: false,
            restart_pos: LogPos::default(),
            ind_rec_pos: LogPos::default(),
            start_write_head: LogPos::default(),
            flush_set: Vec::new(),
            next_to_flush: 0,
            flush_count: 0,
        }
    }

    fn reset(&mut self) {
        self.phase = CheckpointPhase::Idle;
        self.running = false;
        self.flush_set.clear();
        self.next_to_flush = 0;
        self.flush_count = 0;
    }
}

impl Default for CheckPointState {
    fn default() -> Self {
        Self::new()
    }
}

/// flush一步的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStep {
    More,
    Done,
    Aborted,
}

impl Database {
    /// Collect阶段: 快照writer/flush头, 对活跃事务与每个表的
    /// 队首op回撤restart position, 建flush表集。
    pub fn begin_checkpoint(&self) -> XResult<()> {
        {
            let mut cp = self.cp_state.lock().unwrap();
            if cp.running {
                return Ok(());
            }
            cp.running = true;
            cp.phase = CheckpointPhase::Collecting;
        }

        // restart position理论上限是writer head
        let (write_head, flush_head) = {
            let xlog = self.xlog.lock().unwrap();
            (xlog.write_head(), xlog.flush_head())
        };

        let mut pos = self.xacts.retract_restart_pos(write_head);

        let mut flush_set = Vec::new();
        {
            let mut tables = self.tables.lock().unwrap();
            for tab_id in tables.open_tab_ids() {
                if let Some(tab) = tables.get(tab_id)? {
                    if let Some(p) = tab.head_pending_pos() {
                        pos = pos.min(p);
                    }
                    flush_set.push(CheckpointTable { tab_id, flushed: 0 });
                }
            }
        }

        let mut cp = self.cp_state.lock().unwrap();
        cp.restart_pos = pos;
        cp.ind_rec_pos = flush_head;
        cp.start_write_head = write_head;
        cp.flush_set = flush_set;
        cp.next_to_flush = 0;
        cp.flush_count = 0;
        cp.phase = CheckpointPhase::Flushing;
        Ok(())
    }

    /// Flush阶段的一步: flush一个表的记录/行文件与索引。
    /// 表与表之间释放checkpoint monitor。
    pub fn checkpoint_flush_step(&self, mode: FlushPaceMode) -> XResult<FlushStep> {
        let (idx, tab_id) = {
            let mut cp = self.cp_state.lock().unwrap();
            if !cp.running {
                return Ok(FlushStep::Aborted);
            }
            if cp.next_to_flush >= cp.flush_set.len() {
                cp.phase = CheckpointPhase::Writing;
                return Ok(FlushStep::Done);
            }
            (cp.next_to_flush, cp.flush_set[cp.next_to_flush].tab_id)
        };

        // 节奏控制
        let activity = {
            let head = self.xlog.lock().unwrap().write_head();
            let cp = self.cp_state.lock().unwrap();
            cp.start_write_head != head
        };
        match mode {
            FlushPaceMode::IdleOnly => {
                if activity {
                    info!("checkpoint aborted: writer activity observed.");
                    self.abort_checkpoint();
                    return Ok(FlushStep::Aborted);
                }
            }
            FlushPaceMode::PauseIfActivity => {
                if activity {
                    thread::sleep(Duration::from_millis(2));
                }
            }
            FlushPaceMode::NoPause => {}
        }

        {
            let mut tables = self.tables.lock().unwrap();
            if let Some(tab) = tables.get(tab_id)? {
                tab.flush_data()?;
                tab.flush_index()?;
            }
        }

        let mut cp = self.cp_state.lock().unwrap();
        if let Some(entry) = cp.flush_set.get_mut(idx) {
            entry.flushed = REC_ROW_FLUSHED | INDEX_FLUSHED;
        }
        cp.next_to_flush += 1;
        cp.flush_count += 1;
        Ok(FlushStep::More)
    }

    pub fn abort_checkpoint(&self) {
        let mut cp = self.cp_state.lock().unwrap();
        cp.reset();
    }

    /// Write+Retire阶段: 序列化checkpoint记录到另一个restart槽,
    /// 然后退休上一轮列出的xlog文件与已删空的数据日志。
    /// 本轮新到期的xlog文件只列入记录, 下一轮才物理删除。
    ///
    /// 上次checkpoint以来无变化且无退休工作挂起时跳过写盘。
    pub fn end_checkpoint(&self) -> XResult<bool> {
        let (restart_pos, ind_rec_pos) = {
            let cp = self.cp_state.lock().unwrap();
            if !cp.running || cp.next_to_flush < cp.flush_set.len() {
                return Ok(false);
            }
            (cp.restart_pos, cp.ind_rec_pos)
        };

        let (to_delete, deleted_count) = {
            let data_logs = self.data_logs.lock().unwrap();
            (data_logs.to_delete_snapshot(), data_logs.deleted_count())
        };

        // xlog退休边界: restart之前的文件, 保留配置的尾巴
        let boundary = {
            let mut b = restart_pos.log_id;
            let keep = self.config.min_log_files_to_keep();
            if keep > 0 {
                b = b.saturating_sub(keep).max(1);
            }
            b
        };
        // 上一轮checkpoint列出的xlog文件本轮才物理删除;
        // 本轮新到期的只列入记录, 等下一轮。
        let prev_retire = self.restart.lock().unwrap().pending_log_retire.clone();
        let new_retire: Vec<u32> = xlog::list_log_ids(&self.config.xlog_dir())?
            .into_iter()
            .filter(|id| *id < boundary && !prev_retire.contains(id))
            .collect();

        {
            let restart = self.restart.lock().unwrap();
            // 删除列表非空时必须再写一次checkpoint, 否则id会被过早复用/
            // 待退休文件永远不被释放
            if to_delete.is_empty() && deleted_count == 0
                && prev_retire.is_empty() && new_retire.is_empty()
                && !restart.cp_pos.is_before(&restart_pos) {
                drop(restart);
                self.abort_checkpoint();
                return Ok(true);
            }
        }

        let curr_tab_id = self.curr_tab_id();
        let max_xact_id = self.max_xact_id();
        let (record, slot_no) = {
            let mut restart = self.restart.lock().unwrap();
            // 同位置的两个checkpoint靠编号区分, 编号大者新
            restart.cp_number += 1;
            let record = CheckpointRecord {
                checkpoint_no: restart.cp_number,
                restart_pos,
                max_table_id: curr_tab_id.max(restart.max_tab_id),
                max_xact_id,
                ind_rec_pos,
                deleted_log_ids: new_retire.iter().map(|id| *id as u16).collect(),
            };
            (record, restart.next_res_no)
        };
        let path = RestartState::restart_file_path(&self.config, slot_no);
        if let Err(e) = record.write_to_file(&path) {
            error!("checkpoint write to {:?} failed: {}.", path, e);
            self.enter_read_only();
            return Err(XtError::Fatal(format!("checkpoint write failed: {}.", e)));
        }

        {
            let mut restart = self.restart.lock().unwrap();
            restart.next_res_no = (restart.next_res_no % 2) + 1;
            restart.cp_pos = restart_pos;
            restart.ind_rec_pos = ind_rec_pos;
            restart.pending_log_retire = new_retire.clone();
        }
        info!("checkpoint {} written at {}-{}.", record.checkpoint_no, restart_pos.log_id, restart_pos.offset);

        {
            let mut cp = self.cp_state.lock().unwrap();
            cp.phase = CheckpointPhase::Retiring;
        }

        // 上一轮物理删除的数据日志: id从现在起可复用
        self.data_logs.lock().unwrap().forget_deleted();

        // 退休上一轮checkpoint列出的xlog文件。
        // 本轮新列入记录的文件留在盘上, 崩溃后它们仍可恢复;
        // 下一次checkpoint (其记录不再列出它们) 才物理删除。
        {
            let mut xlog = self.xlog.lock().unwrap();
            for id in &prev_retire {
                xlog.delete_log(*id)?;
            }
            let min_on_disk = new_retire.iter().min().copied().unwrap_or(boundary);
            xlog.set_min_log_id(min_on_disk.min(boundary));
        }

        // 本轮列出的数据日志: 物理删除, id进入deleted
        {
            let mut data_logs = self.data_logs.lock().unwrap();
            for id in to_delete {
                data_logs.delete_data_log(id)?;
            }
        }

        self.abort_checkpoint();
        Ok(true)
    }

    /// 完整checkpoint: IDLE -> COLLECTING -> FLUSHING -> WRITING -> RETIRING -> IDLE
    pub fn checkpoint(&self, mode: FlushPaceMode) -> XResult<bool> {
        self.begin_checkpoint()?;
        loop {
            match self.checkpoint_flush_step(mode)? {
                FlushStep::More => {
                    // 协作式退出: 每个表边界检查quit
                    if self.quit_requested() && mode != FlushPaceMode::NoPause {
                        self.abort_checkpoint();
                        return Ok(false);
                    }
                }
                FlushStep::Done => break,
                FlushStep::Aborted => return Ok(false),
            }
        }
        self.end_checkpoint()
    }
}

/// checkpointer线程: condvar上400ms轮询, 触发条件任一满足即跑。
pub fn start_checkpointer(db: Arc<Database>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("xt-checkpointer".to_string())
        .spawn(move || checkpointer_main(db))
        .unwrap()
}

fn checkpointer_main(db: Arc<Database>) {
    info!("checkpointer started.");
    loop {
        {
            let cp = db.cp_state.lock().unwrap();
            let _ = db.cp_wake.wait_timeout(cp, Duration::from_millis(CHECKPOINTER_POLL_MS)).unwrap();
        }
        if db.quit_requested() {
            break;
        }

        let explicit = db.take_checkpoint_request();
        let retention = {
            let data_logs = db.data_logs.lock().unwrap();
            data_logs.to_delete_count() > 0 || data_logs.deleted_count() > 0
        } || !db.restart.lock().unwrap().pending_log_retire.is_empty();
        let due = db.bytes_since_checkpoint() >= db.config.checkpoint_frequency();

        if explicit || retention || due {
            let mode = if explicit {
                FlushPaceMode::NoPause
            } else {
                db.config.flush_pace_mode()
            };
            match db.checkpoint(mode) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!("checkpointer: fatal: {}.", e);
                    break;
                }
                Err(e) => {
                    warn!("checkpointer: {}.", e);
                }
            }
        }
    }

    // shutdown路径: 最后一个不降速的checkpoint
    if !db.is_read_only() {
        if let Err(e) = db.checkpoint(FlushPaceMode::NoPause) {
            warn!("final checkpoint failed: {}.", e);
        }
    }
    info!("checkpointer stopped.");
}

pub fn stop_checkpointer(db: &Arc<Database>, handle: JoinHandle<()>) {
    db.request_quit();
    db.cp_wake.notify_all();
    let _ = handle.join();
}
