use std::path::PathBuf;

use tracing::{debug, info, warn};

use common::config::{RecoveryProgress, XtConfig};
use common::err::engine_error::XtError;
use common::err::XResult;

use crate::checkpoint::CheckpointRecord;
use crate::data_log::DataLogManager;
use crate::op_seq;
use crate::record::{LogRecord, LogRecordType};
use crate::table::{rec_is_ext, rec_is_free, PendingOp, Table, NIL_ID, REC_SLOT_SIZE};
use crate::table_pool::TablePool;
use crate::xact::XactStore;
use crate::xlog::{self, LogPos, XlogReader};

/////////////////////////////////////
/// Restart状态。
///
/// 两个restart槽轮换写。 启动时读出两个, 选胜者:
/// checksum通过者; 都通过时restart位置靠后者,
/// 位置相同时checkpoint号大者。
/////////////////////////////////////
#[derive(Debug, Clone)]
pub struct RestartState {
    pub cp_number: u64,
    /// 恢复起点
    pub cp_pos: LogPos,
    /// 此位置起redo索引项
    pub ind_rec_pos: LogPos,
    /// 下一次checkpoint写哪个槽 (1或2)
    pub next_res_no: u8,
    pub max_tab_id: u32,
    pub max_xact_id: u32,
    /// 胜者checkpoint列出的待退休xlog文件id。
    /// 这些文件留在盘上, 等下一次checkpoint的retire才物理删除。
    pub pending_log_retire: Vec<u32>,
}

impl RestartState {
    /// `<db>/system/restart-<no>.xt`
    pub fn restart_file_path(config: &XtConfig, no: u8) -> PathBuf {
        config.system_dir().join(format!("restart-{}.xt", no))
    }

    pub fn init(config: &XtConfig) -> XResult<RestartState> {
        let r1 = CheckpointRecord::read_from_file(&Self::restart_file_path(config, 1))?;
        let r2 = CheckpointRecord::read_from_file(&Self::restart_file_path(config, 2))?;

        let (winner, slot) = match (r1, r2) {
            (Some(a), Some(b)) => {
                if b.restart_pos.is_before(&a.restart_pos) {
                    (Some(a), 1)
                } else if a.restart_pos.is_before(&b.restart_pos) {
                    (Some(b), 2)
                } else if a.checkpoint_no >= b.checkpoint_no {
                    (Some(a), 1)
                } else {
                    (Some(b), 2)
                }
            }
            (Some(a), None) => (Some(a), 1),
            (None, Some(b)) => (Some(b), 2),
            (None, None) => (None, 0),
        };

        match winner {
            Some(cp) => {
                info!("CHECKPOINT no={} log={} offset={}.", cp.checkpoint_no, cp.restart_pos.log_id, cp.restart_pos.offset);
                Ok(RestartState {
                    cp_number: cp.checkpoint_no,
                    cp_pos: cp.restart_pos,
                    ind_rec_pos: cp.ind_rec_pos,
                    next_res_no: if slot == 1 { 2 } else { 1 },
                    max_tab_id: cp.max_table_id,
                    max_xact_id: cp.max_xact_id,
                    pending_log_retire: cp.deleted_log_ids.iter().map(|id| *id as u32).collect(),
                })
            }
            None => {
                // 无有效checkpoint: 合成 (最低日志文件, 0)
                let min_log = xlog::list_log_ids(&config.xlog_dir())?.first().copied().unwrap_or(1);
                let pos = LogPos::new(min_log, 0);
                Ok(RestartState {
                    cp_number: 0,
                    cp_pos: pos,
                    ind_rec_pos: pos,
                    next_res_no: 1,
                    max_tab_id: 0,
                    max_xact_id: 0,
                    pending_log_retire: Vec::new(),
                })
            }
        }
    }
}

/// 恢复结果
#[derive(Debug, Clone, Copy)]
pub struct RecoveryOutcome {
    pub end_pos: LogPos,
    pub bytes_read: u64,
    pub tail_corrupt: bool,
}

/// 从restart位置回放xlog到末尾。
///
/// 回放顺序应用mutation; 失序到达的op进表内队列;
/// 日志尽头对所有表强制sync_operations。
pub fn recover(config: &XtConfig,
               restart: &mut RestartState,
               tables: &mut TablePool,
               xacts: &XactStore,
               data_logs: &mut DataLogManager) -> XResult<RecoveryOutcome> {
    let progress = config.recovery_print_progress();
    let mut reader = XlogReader::open(&config.xlog_dir(), restart.cp_pos)?;
    let total = reader.bytes_to_read()?;

    if total > 0 && progress != RecoveryProgress::Off {
        info!("Recovering from {}-{}, bytes to read: {}",
              restart.cp_pos.log_id, restart.cp_pos.offset, total);
    }

    let mut last_pct: u64 = 0;
    while let Some((record, pos)) = reader.next()? {
        if progress == RecoveryProgress::Full {
            print_log_record(&record, pos);
        }
        if total > 0 && progress != RecoveryProgress::Off {
            let pct = reader.bytes_read() * 100 / total;
            if pct / 10 > last_pct / 10 {
                info!("Recovering: {}%", pct);
                last_pct = pct;
            }
        }

        match &record {
            LogRecord::Header { .. } | LogRecord::NewLog { .. } | LogRecord::EndOfLog => {}
            LogRecord::DelLog { log_id } => {
                // 运行期已删的数据日志; 重放时确保文件不在, id挂deleted表
                data_logs.delete_data_log(*log_id)?;
            }
            LogRecord::NewTab { tab_id } => {
                tables.create(*tab_id)?;
                if *tab_id > restart.max_tab_id {
                    restart.max_tab_id = *tab_id;
                }
            }
            LogRecord::Commit { xact_id } => {
                restart.max_xact_id = op_seq::max_seq(restart.max_xact_id, *xact_id);
                xacts.mark_ended(*xact_id, true);
            }
            LogRecord::Abort { xact_id } => {
                restart.max_xact_id = op_seq::max_seq(restart.max_xact_id, *xact_id);
                xacts.mark_ended(*xact_id, false);
            }
            LogRecord::Cleanup { xact_id } => {
                xacts.cleanup(*xact_id);
            }
            LogRecord::OpSync => {
                // 跨全表fence
                sync_operations(tables, data_logs, restart.ind_rec_pos)?;
            }
            _ => {
                apply_in_order(tables, xacts, data_logs, restart.ind_rec_pos, &record, pos, true)?;
            }
        }
    }

    // 日志尽头: 剩余失序op按放松规则清算
    sync_operations(tables, data_logs, restart.ind_rec_pos)?;
    tables.flush_all()?;

    let end_pos = reader.position();
    if (total > 0 || reader.bytes_read() > 0) && progress != RecoveryProgress::Off {
        info!("Recovering complete at {}-{}, bytes read: {}",
              end_pos.log_id, end_pos.offset, reader.bytes_read());
    }

    Ok(RecoveryOutcome {
        end_pos,
        bytes_read: reader.bytes_read(),
        tail_corrupt: reader.tail_corrupt(),
    })
}

/// `log=<id> offset=<off> <TYPE> op=<seq> tab=<id>` 行 (Full进度)
fn print_log_record(record: &LogRecord, pos: LogPos) {
    match (record.op_seq(), record.tab_id()) {
        (Some(op), Some(tab)) => {
            info!("log={} offset={} {} op={} tab={}", pos.log_id, pos.offset, record.record_type().name(), op, tab);
        }
        _ => {
            info!("log={} offset={} {}", pos.log_id, pos.offset, record.record_type().name());
        }
    }
}

/// 按op-seq有序应用一条表级记录。
///
/// `op_seq == head+1` 直接应用并顺带排空衔接上的队列;
/// 否则入队 (超过阈值是BUG)。 恢复期首条op对齐表头,
/// 早于表头的op跳过 (重复回放幂等)。
pub fn apply_in_order(tables: &mut TablePool,
                      xacts: &XactStore,
                      data_logs: &mut DataLogManager,
                      ind_rec_pos: LogPos,
                      record: &LogRecord,
                      pos: LogPos,
                      in_recover: bool) -> XResult<()> {
    let (op, tab_id) = match (record.op_seq(), record.tab_id()) {
        (Some(op), Some(tab_id)) => (op, tab_id),
        _ => return Ok(()),
    };

    // BG变体先宣告事务, 与表是否存在无关
    if let LogRecord::Mutation { kind, xact_id, .. } = record {
        if kind.is_bg() {
            xacts.materialize_bg(*xact_id, pos);
        } else if in_recover && *xact_id != 0 {
            xacts.begin(*xact_id, pos);
        }
    }

    let tab = match tables.get(tab_id)? {
        Some(tab) => tab,
        None => {
            debug!("op {} for dropped table {}, skipped.", op, tab_id);
            return Ok(());
        }
    };

    if in_recover {
        tab.align_recovery_head(op);
    }
    if !op_seq::is_before(tab.head_op_seq, op) {
        // 已应用过 (重复回放)
        return Ok(());
    }

    if tab.head_op_seq.wrapping_add(1) == op {
        let check_index = in_recover && !pos.is_before(&ind_rec_pos);
        apply_change(tab, record, true, check_index, data_logs)?;
        tab.note_applied(op);

        // 排空衔接上的队列前缀
        while let Some(p) = tab.pop_next_in_seq() {
            let check_index = in_recover && !p.pos.is_before(&ind_rec_pos);
            apply_change(tab, &p.record, true, check_index, data_logs)?;
            tab.note_applied(p.op_seq);
        }
    } else {
        tab.queue_op(PendingOp { op_seq: op, pos, record: record.clone() })?;
    }
    Ok(())
}

/// 日志尽头的失序清算: 所有表的剩余op按放松规则应用。
/// 完成后每个表的head等于观察到的最大op-seq。
pub fn sync_operations(tables: &mut TablePool,
                       data_logs: &mut DataLogManager,
                       ind_rec_pos: LogPos) -> XResult<()> {
    for tab_id in tables.open_tab_ids() {
        let tab = match tables.get(tab_id)? {
            Some(tab) => tab,
            None => continue,
        };
        if tab.pending_count() == 0 {
            continue;
        }
        let ops = tab.take_all_pending();
        debug!("sync_operations: table {} applying {} out-of-sequence ops.", tab_id, ops.len());
        for p in ops {
            let check_index = !p.pos.is_before(&ind_rec_pos);
            apply_change(tab, &p.record, false, check_index, data_logs)?;
            tab.note_applied(p.op_seq);
        }
    }
    Ok(())
}

/// 索引redo错误分类: 瞬时错误让整个pass失败重试;
/// 结构性错误把索引标记corrupt, 回放继续。
fn redo_index_insert(tab: &mut Table, key: Vec<u8>, row_id: u32, rec_id: u32) -> XResult<()> {
    match tab.index.insert(key, row_id, rec_id) {
        Ok(()) => Ok(()),
        Err(e) if e.is_transient() => Err(e),
        Err(e) => {
            warn!("index redo failed structurally on table {}: {}. marking index corrupted.", tab.tab_id, e);
            tab.index.mark_corrupted();
            Ok(())
        }
    }
}

/////////////////////////////////////
/// 应用一条mutation到表文件。
///
/// in_sequence=true: 假定该表此前所有op都已应用。
/// in_sequence=false (失序清算): 放松规则 --
/// EOF跳空洞补free链、free链按id搜索摘除、
/// 行链先摘再free、不信任日志里的链头。
/////////////////////////////////////
pub fn apply_change(tab: &mut Table,
                    record: &LogRecord,
                    in_sequence: bool,
                    check_index: bool,
                    data_logs: &mut DataLogManager) -> XResult<()> {
    let check_index = check_index && !tab.index.is_corrupted();

    match record {
        //////////////////////
        // EOF分配的mutation
        //////////////////////
        LogRecord::Mutation { kind, rec_id, row_id, image, .. } if !kind.is_fl() => {
            let rec_id = *rec_id;

            // 先摘旧索引项, 否则覆盖后键值丢失
            if check_index && *kind == LogRecordType::RecModified {
                let old = tab.read_rec(rec_id, REC_SLOT_SIZE as usize)?;
                let key = tab.index.key_from_image(&old);
                tab.index.remove(&key, rec_id);
            }

            tab.write_rec(rec_id, image)?;

            if check_index && !kind.is_delete() {
                let key = tab.index.key_from_image(image);
                redo_index_insert(tab, key, *row_id, rec_id)?;
            }

            if !in_sequence {
                // EOF分配失序: 和丢失op之间的空洞补到free链
                while tab.head_rec_eof_id < rec_id {
                    let gap = tab.head_rec_eof_id;
                    let next = tab.head_rec_free_id;
                    tab.write_free_slot(gap, 0, next)?;
                    tab.head_rec_free_id = gap;
                    tab.head_rec_fnum += 1;
                    tab.head_rec_eof_id += 1;
                }
            }
            if tab.head_rec_eof_id < rec_id + 1 {
                tab.head_rec_eof_id = rec_id + 1;
            }
        }

        //////////////////////
        // free链分配的mutation
        //////////////////////
        LogRecord::Mutation { kind, rec_id, row_id, free_rec_id, image, .. } => {
            let rec_id = *rec_id;
            let mut free_ref = *free_rec_id;
            let mut adjust_free = true;

            if check_index && !kind.is_delete() {
                let key = tab.index.key_from_image(image);
                redo_index_insert(tab, key, *row_id, rec_id)?;
            }

            if !in_sequence {
                // 失序: rec可能不在链头, 搜索摘除
                let mut link = tab.head_rec_free_id;
                let mut prev = NIL_ID;
                while link != NIL_ID {
                    if link == rec_id {
                        break;
                    }
                    prev = link;
                    link = tab.read_free_next(link)?;
                }
                if link == rec_id {
                    let next = tab.read_free_next(rec_id)?;
                    if prev != NIL_ID {
                        // 摘中间: prev跳过rec
                        tab.write_free_slot(prev, 0, next)?;
                        free_ref = tab.head_rec_free_id;
                    } else {
                        // 链头
                        free_ref = next;
                    }
                } else {
                    // 不在free链上: 当EOF分配对待, 空洞补free链
                    while tab.head_rec_eof_id < rec_id {
                        let gap = tab.head_rec_eof_id;
                        let head = tab.head_rec_free_id;
                        tab.write_free_slot(gap, 0, head)?;
                        tab.head_rec_free_id = gap;
                        tab.head_rec_fnum += 1;
                        tab.head_rec_eof_id += 1;
                    }
                    adjust_free = false;
                }
            }

            if tab.head_rec_eof_id < rec_id + 1 {
                tab.head_rec_eof_id = rec_id + 1;
            }
            if adjust_free {
                tab.head_rec_free_id = free_ref;
                tab.head_rec_fnum = tab.head_rec_fnum.saturating_sub(1);
            }
            tab.write_rec(rec_id, image)?;
        }

        //////////////////////
        // 记录释放
        //////////////////////
        LogRecord::RecFreed { kind, rec_id, xact_id, stat_id, next_rec_id, .. } => {
            let rec_id = *rec_id;
            let mut do_ext_and_index = *kind != LogRecordType::RecFreed;

            if do_ext_and_index || check_index {
                // 重复恢复防护: 盘上记录已不是被删的那个则跳过ext/index
                let head = tab.read_rec_head(rec_id)?;
                if head.stat_id != *stat_id || head.xact_id != *xact_id {
                    do_ext_and_index = false;
                }

                if *kind == LogRecordType::RecRemovedExt && do_ext_and_index {
                    if rec_is_ext(head.status) {
                        let (dlog_id, dlog_off, dlog_size) = tab.read_ext_ref(rec_id)?;
                        if dlog_id != 0 || dlog_off != 0 {
                            match data_logs.delete(dlog_id as u32, dlog_off, dlog_size, tab.tab_id, rec_id) {
                                Ok(()) => {}
                                Err(e) if e.is_soft() => {
                                    debug!("extent delete for tab={} rec={}: {}.", tab.tab_id, rec_id, e);
                                }
                                Err(e) => return Err(e),
                            }
                        }
                    }
                }

                if check_index {
                    let old = tab.read_rec(rec_id, REC_SLOT_SIZE as usize)?;
                    let key = tab.index.key_from_image(&old);
                    tab.index.remove(&key, rec_id);
                }
            }

            free_record(tab, rec_id, crate::table::TAB_STATUS_FREED, *stat_id, *next_rec_id, in_sequence)?;
        }

        //////////////////////
        // before-image删除
        //////////////////////
        LogRecord::RecRemovedBi { rec_id, stat_id, new_rec_type, next_rec_id, image, .. } => {
            let rec_id = *rec_id;

            if check_index {
                // 用before-image定位要摘的索引项
                let key = tab.index.key_from_image(image);
                tab.index.remove(&key, rec_id);
            }

            // before-image带扩展指针时顺带删extent
            if image.len() >= (crate::table::EXT_SIZE_OFFSET + 4) as usize && rec_is_ext(image[0]) {
                let dlog_id = u16::from_le_bytes([image[14], image[15]]);
                let mut off_bytes = [0u8; 8];
                off_bytes[..6].copy_from_slice(&image[16..22]);
                let dlog_off = u64::from_le_bytes(off_bytes);
                let dlog_size = u32::from_le_bytes([image[22], image[23], image[24], image[25]]);
                if dlog_id != 0 || dlog_off != 0 {
                    match data_logs.delete(dlog_id as u32, dlog_off, dlog_size, tab.tab_id, rec_id) {
                        Ok(()) => {}
                        Err(e) if e.is_soft() => {
                            debug!("extent delete for tab={} rec={}: {}.", tab.tab_id, rec_id, e);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            // 换上新状态字节后入free链
            free_record(tab, rec_id, *new_rec_type, *stat_id, *next_rec_id, in_sequence)?;
        }

        //////////////////////
        // 记录头重写
        //////////////////////
        LogRecord::RecMoved { rec_id, data_log_id, data_log_offset, .. } => {
            tab.write_ext_ptr(*rec_id, *data_log_id, *data_log_offset)?;
        }
        LogRecord::RecCleaned { rec_id, status, next_rec_id, .. } => {
            tab.write_status(*rec_id, *status)?;
            tab.write_prev_link(*rec_id, *next_rec_id)?;
        }
        LogRecord::RecCleaned1 { rec_id, status, .. } => {
            tab.write_status(*rec_id, *status)?;
        }
        LogRecord::RecUnlinked { rec_id, prev_rec_id, .. } => {
            if in_sequence {
                tab.write_prev_link(*rec_id, *prev_rec_id)?;
            }
            // 失序时忽略: 最终的free会做unlink
        }

        //////////////////////
        // 行分配与行链
        //////////////////////
        LogRecord::RowNew { row_id, .. } => {
            let row_id = *row_id;
            if !in_sequence {
                while tab.head_row_eof_id < row_id {
                    let gap = tab.head_row_eof_id;
                    let next = tab.head_row_free_id;
                    tab.row_set(gap, next)?;
                    tab.head_row_free_id = gap;
                    tab.head_row_fnum += 1;
                    tab.head_row_eof_id += 1;
                }
            }
            if tab.head_row_eof_id < row_id + 1 {
                tab.head_row_eof_id = row_id + 1;
            }
        }
        LogRecord::RowNewFl { row_id, free_row_id, .. } => {
            let row_id = *row_id;
            let mut free_ref = *free_row_id;
            let mut adjust = true;
            if !in_sequence {
                let mut link = tab.head_row_free_id;
                let mut prev = NIL_ID;
                while link != NIL_ID {
                    if link == row_id {
                        break;
                    }
                    prev = link;
                    link = tab.row_get(link)?;
                }
                if link == row_id {
                    let next = tab.row_get(row_id)?;
                    if prev != NIL_ID {
                        tab.row_set(prev, next)?;
                        free_ref = tab.head_row_free_id;
                    } else {
                        free_ref = next;
                    }
                } else {
                    adjust = false;
                }
            }
            if tab.head_row_eof_id < row_id + 1 {
                tab.head_row_eof_id = row_id + 1;
            }
            if adjust {
                tab.head_row_free_id = free_ref;
                tab.head_row_fnum = tab.head_row_fnum.saturating_sub(1);
            }
        }
        LogRecord::RowAddRec { row_id, rec_id, .. } => {
            let (row_id, rec_id) = (*row_id, *rec_id);
            if !in_sequence {
                // 记录进了行链头, 但prev可能指着丢失op留下的值, 修正之
                let next_ref = tab.row_get(row_id)?;
                let head = tab.read_rec_head(rec_id)?;
                if head.row_id == row_id && head.prev_rec_id != next_ref && rec_id != next_ref {
                    tab.write_prev_link(rec_id, next_ref)?;
                }
            }
            tab.row_set(row_id, rec_id)?;
            if tab.head_row_eof_id < row_id + 1 {
                tab.head_row_eof_id = row_id + 1;
            }
        }
        LogRecord::RowSet { row_id, rec_id, .. } => {
            if in_sequence {
                tab.row_set(*row_id, *rec_id)?;
                if tab.head_row_eof_id < row_id + 1 {
                    tab.head_row_eof_id = row_id + 1;
                }
            }
            // 失序时忽略: 记录free时自动从行摘除
        }
        LogRecord::RowFreed { row_id, next_row_id, .. } => {
            let row_id = *row_id;
            let next = if in_sequence {
                // 信任日志里的链
                *next_row_id
            } else {
                // 失序: 压到当前链头, 不信任日志值
                tab.head_row_free_id
            };
            tab.row_set(row_id, next)?;
            tab.head_row_free_id = row_id;
            tab.head_row_fnum += 1;
            if tab.head_row_eof_id < row_id + 1 {
                tab.head_row_eof_id = row_id + 1;
            }
        }

        LogRecord::NoOp { .. } => {}

        other => {
            return Err(XtError::Bug(format!(
                "apply_change got non-table record {}.", other.record_type().name())));
        }
    }
    Ok(())
}

/// 共享的free路径。
/// 失序时: 记录已free则跳过; 先从行链摘除; 压当前free链头。
fn free_record(tab: &mut Table,
               rec_id: u32,
               status: u8,
               stat_id: u8,
               logged_next: u32,
               in_sequence: bool) -> XResult<()> {
    let next;
    if !in_sequence {
        let head = tab.read_rec_head(rec_id)?;
        if rec_is_free(head.status) {
            return Ok(());
        }
        let row_id = head.row_id;

        // 行链摘除
        let mut link = tab.row_get(row_id)?;
        let mut prev = NIL_ID;
        let mut rec_prev = NIL_ID;
        while link != NIL_ID {
            let lh = tab.read_rec_head(link)?;
            if link == rec_id {
                rec_prev = lh.prev_rec_id;
                break;
            }
            if lh.row_id != row_id || rec_is_free(lh.status) {
                link = NIL_ID;
                break;
            }
            prev = link;
            link = lh.prev_rec_id;
        }
        if link == rec_id {
            if prev != NIL_ID {
                tab.write_prev_link(prev, rec_prev)?;
            } else {
                tab.row_set(row_id, rec_prev)?;
            }
        }
        next = tab.head_rec_free_id;
    } else {
        next = logged_next;
    }

    let mut slot = [0u8; 6];
    slot[0] = status;
    slot[1] = stat_id;
    slot[2..6].copy_from_slice(&next.to_le_bytes());
    tab.write_rec(rec_id, &slot)?;
    tab.head_rec_free_id = rec_id;
    tab.head_rec_fnum += 1;
    Ok(())
}
