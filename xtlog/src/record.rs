use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::checksum::{checksum_1, checksum_2};
use common::err::engine_error::XtError;
use common::err::XResult;

/// xlog文件首记录的magic
pub const XLOG_MAGIC: u32 = 0x58544C47;
/// xlog文件格式版本
pub const XLOG_VERSION: u16 = 1;

/////////////////////////////////////
/// 日志记录类型。 1字节, 线上契约值。
/////////////////////////////////////
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LogRecordType {
    Header = 1,
    NewLog = 2,
    DelLog = 3,
    NewTab = 4,

    Commit = 5,
    Abort = 6,
    Cleanup = 7,

    RecModified = 8,
    Update = 9,
    UpdateBg = 10,
    UpdateFl = 11,
    UpdateFlBg = 12,
    Insert = 13,
    InsertBg = 14,
    InsertFl = 15,
    InsertFlBg = 16,
    Delete = 17,
    DeleteBg = 18,
    DeleteFl = 19,
    DeleteFlBg = 20,

    RecFreed = 21,
    RecRemoved = 22,
    RecRemovedExt = 23,
    RecRemovedBi = 24,
    RecMoved = 25,
    RecCleaned = 26,
    RecCleaned1 = 27,
    RecUnlinked = 28,

    RowNew = 29,
    RowNewFl = 30,
    RowAddRec = 31,
    RowSet = 32,
    RowFreed = 33,

    OpSync = 34,
    NoOp = 35,
    EndOfLog = 36,
}

impl LogRecordType {
    /// free-list分配变体 (payload自由链上的槽)
    pub fn is_fl(&self) -> bool {
        matches!(self,
            LogRecordType::UpdateFl | LogRecordType::UpdateFlBg
            | LogRecordType::InsertFl | LogRecordType::InsertFlBg
            | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg)
    }

    /// BG变体: 首次见到即宣告其事务
    pub fn is_bg(&self) -> bool {
        matches!(self,
            LogRecordType::UpdateBg | LogRecordType::UpdateFlBg
            | LogRecordType::InsertBg | LogRecordType::InsertFlBg
            | LogRecordType::DeleteBg | LogRecordType::DeleteFlBg)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self,
            LogRecordType::Delete | LogRecordType::DeleteBg
            | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg)
    }

    /// 去掉FL/BG修饰后的基础类型
    pub fn base(&self) -> LogRecordType {
        match self {
            LogRecordType::UpdateBg | LogRecordType::UpdateFl | LogRecordType::UpdateFlBg => LogRecordType::Update,
            LogRecordType::InsertBg | LogRecordType::InsertFl | LogRecordType::InsertFlBg => LogRecordType::Insert,
            LogRecordType::DeleteBg | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg => LogRecordType::Delete,
            t => *t,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogRecordType::Header => "HEADER",
            LogRecordType::NewLog => "NEW LOG",
            LogRecordType::DelLog => "DEL LOG",
            LogRecordType::NewTab => "NEW TAB",
            LogRecordType::Commit => "COMMIT",
            LogRecordType::Abort => "ABORT",
            LogRecordType::Cleanup => "CLEANUP",
            LogRecordType::RecModified => "MODIFIED",
            LogRecordType::Update => "UPDATE",
            LogRecordType::UpdateBg => "UPDATE-BG",
            LogRecordType::UpdateFl => "UPDATE-FL",
            LogRecordType::UpdateFlBg => "UPDATE-FL-BG",
            LogRecordType::Insert => "INSERT",
            LogRecordType::InsertBg => "INSERT-BG",
            LogRecordType::InsertFl => "INSERT-FL",
            LogRecordType::InsertFlBg => "INSERT-FL-BG",
            LogRecordType::Delete => "DELETE",
            LogRecordType::DeleteBg => "DELETE-BG",
            LogRecordType::DeleteFl => "DELETE-FL",
            LogRecordType::DeleteFlBg => "DELETE-FL-BG",
            LogRecordType::RecFreed => "FREE REC",
            LogRecordType::RecRemoved => "REMOVED REC",
            LogRecordType::RecRemovedExt => "REMOVED-X REC",
            LogRecordType::RecRemovedBi => "REMOVED-BI REC",
            LogRecordType::RecMoved => "MOVED REC",
            LogRecordType::RecCleaned => "CLEAN REC",
            LogRecordType::RecCleaned1 => "CLEAN REC-1",
            LogRecordType::RecUnlinked => "UNLINK REC",
            LogRecordType::RowNew => "NEW ROW",
            LogRecordType::RowNewFl => "NEW ROW-FL",
            LogRecordType::RowAddRec => "REC ADD ROW",
            LogRecordType::RowSet => "SET ROW",
            LogRecordType::RowFreed => "FREE ROW",
            LogRecordType::OpSync => "OP SYNC",
            LogRecordType::NoOp => "NO OP",
            LogRecordType::EndOfLog => "END OF LOG",
        }
    }
}

/////////////////////////////////////
/// 日志记录。
///
/// 线上形态: 1字节类型 + checksum(控制记录1字节, 带镜像的记录
/// 2字节) + 类型各自的定长/变长尾部。 checksum覆盖其后的全部
/// 字节, 回放时校验失败视同尾部截断。
/////////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Header {
        version: u16,
        log_id: u32,
    },
    NewLog {
        next_log_id: u32,
    },
    DelLog {
        log_id: u32,
    },
    NewTab {
        tab_id: u32,
    },
    Commit {
        xact_id: u32,
    },
    Abort {
        xact_id: u32,
    },
    Cleanup {
        xact_id: u32,
    },
    /// REC_MODIFIED / UPDATE / INSERT / DELETE 及 FL/BG 变体。
    /// image是写入记录槽的完整after-image (含记录头)。
    Mutation {
        kind: LogRecordType,
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        row_id: u32,
        xact_id: u32,
        /// FL变体: pop后的free链头
        free_rec_id: u32,
        image: Vec<u8>,
    },
    /// REC_FREED / REC_REMOVED / REC_REMOVED_EXT。
    /// 嵌入free槽镜像 (stat_id + next链)。
    RecFreed {
        kind: LogRecordType,
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        xact_id: u32,
        stat_id: u8,
        next_rec_id: u32,
    },
    /// 带before-image的删除; new_rec_type替换记录头状态字节后入free链。
    RecRemovedBi {
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        xact_id: u32,
        stat_id: u8,
        new_rec_type: u8,
        next_rec_id: u32,
        image: Vec<u8>,
    },
    /// 重写rec_id处8字节扩展记录指针
    RecMoved {
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        data_log_id: u16,
        data_log_offset: u64,
    },
    /// 重写记录头 (状态字节 + free链, 6字节)
    RecCleaned {
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        status: u8,
        next_rec_id: u32,
    },
    /// 只重写状态字节 (1字节)
    RecCleaned1 {
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        status: u8,
    },
    RecUnlinked {
        op_seq: u32,
        tab_id: u32,
        rec_id: u32,
        prev_rec_id: u32,
    },
    RowNew {
        op_seq: u32,
        tab_id: u32,
        row_id: u32,
    },
    RowNewFl {
        op_seq: u32,
        tab_id: u32,
        row_id: u32,
        free_row_id: u32,
    },
    RowAddRec {
        op_seq: u32,
        tab_id: u32,
        row_id: u32,
        rec_id: u32,
    },
    RowSet {
        op_seq: u32,
        tab_id: u32,
        row_id: u32,
        rec_id: u32,
    },
    RowFreed {
        op_seq: u32,
        tab_id: u32,
        row_id: u32,
        next_row_id: u32,
    },
    OpSync,
    NoOp {
        op_seq: u32,
        tab_id: u32,
    },
    EndOfLog,
}

impl LogRecord {
    pub fn record_type(&self) -> LogRecordType {
        match self {
            LogRecord::Header { .. } => LogRecordType::Header,
            LogRecord::NewLog { .. } => LogRecordType::NewLog,
            LogRecord::DelLog { .. } => LogRecordType::DelLog,
            LogRecord::NewTab { .. } => LogRecordType::NewTab,
            LogRecord::Commit { .. } => LogRecordType::Commit,
            LogRecord::Abort { .. } => LogRecordType::Abort,
            LogRecord::Cleanup { .. } => LogRecordType::Cleanup,
            LogRecord::Mutation { kind, .. } => *kind,
            LogRecord::RecFreed { kind, .. } => *kind,
            LogRecord::RecRemovedBi { .. } => LogRecordType::RecRemovedBi,
            LogRecord::RecMoved { .. } => LogRecordType::RecMoved,
            LogRecord::RecCleaned { .. } => LogRecordType::RecCleaned,
            LogRecord::RecCleaned1 { .. } => LogRecordType::RecCleaned1,
            LogRecord::RecUnlinked { .. } => LogRecordType::RecUnlinked,
            LogRecord::RowNew { .. } => LogRecordType::RowNew,
            LogRecord::RowNewFl { .. } => LogRecordType::RowNewFl,
            LogRecord::RowAddRec { .. } => LogRecordType::RowAddRec,
            LogRecord::RowSet { .. } => LogRecordType::RowSet,
            LogRecord::RowFreed { .. } => LogRecordType::RowFreed,
            LogRecord::OpSync => LogRecordType::OpSync,
            LogRecord::NoOp { .. } => LogRecordType::NoOp,
            LogRecord::EndOfLog => LogRecordType::EndOfLog,
        }
    }

    /// 携带op-seq的记录 (表级mutation)
    pub fn op_seq(&self) -> Option<u32> {
        match self {
            LogRecord::Mutation { op_seq, .. }
            | LogRecord::RecFreed { op_seq, .. }
            | LogRecord::RecRemovedBi { op_seq, .. }
            | LogRecord::RecMoved { op_seq, .. }
            | LogRecord::RecCleaned { op_seq, .. }
            | LogRecord::RecCleaned1 { op_seq, .. }
            | LogRecord::RecUnlinked { op_seq, .. }
            | LogRecord::RowNew { op_seq, .. }
            | LogRecord::RowNewFl { op_seq, .. }
            | LogRecord::RowAddRec { op_seq, .. }
            | LogRecord::RowSet { op_seq, .. }
            | LogRecord::RowFreed { op_seq, .. }
            | LogRecord::NoOp { op_seq, .. } => Some(*op_seq),
            _ => None,
        }
    }

    pub fn tab_id(&self) -> Option<u32> {
        match self {
            LogRecord::NewTab { tab_id }
            | LogRecord::Mutation { tab_id, .. }
            | LogRecord::RecFreed { tab_id, .. }
            | LogRecord::RecRemovedBi { tab_id, .. }
            | LogRecord::RecMoved { tab_id, .. }
            | LogRecord::RecCleaned { tab_id, .. }
            | LogRecord::RecCleaned1 { tab_id, .. }
            | LogRecord::RecUnlinked { tab_id, .. }
            | LogRecord::RowNew { tab_id, .. }
            | LogRecord::RowNewFl { tab_id, .. }
            | LogRecord::RowAddRec { tab_id, .. }
            | LogRecord::RowSet { tab_id, .. }
            | LogRecord::RowFreed { tab_id, .. }
            | LogRecord::NoOp { tab_id, .. } => Some(*tab_id),
            _ => None,
        }
    }

    /// 2字节checksum的记录 (带镜像)
    fn wide_checksum(t: LogRecordType) -> bool {
        matches!(t,
            LogRecordType::RecModified
            | LogRecordType::Update | LogRecordType::UpdateBg
            | LogRecordType::UpdateFl | LogRecordType::UpdateFlBg
            | LogRecordType::Insert | LogRecordType::InsertBg
            | LogRecordType::InsertFl | LogRecordType::InsertFlBg
            | LogRecordType::Delete | LogRecordType::DeleteBg
            | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg
            | LogRecordType::RecRemovedBi)
    }

    pub fn encode(&self) -> XResult<Vec<u8>> {
        let t = self.record_type();
        let wide = Self::wide_checksum(t);
        let mut buf: Vec<u8> = Vec::with_capacity(32);
        buf.write_u8(t.into())?;
        // checksum占位
        if wide {
            buf.write_u16::<LittleEndian>(0)?;
        } else {
            buf.write_u8(0)?;
        }

        match self {
            LogRecord::Header { version, log_id } => {
                buf.write_u16::<LittleEndian>(*version)?;
                buf.write_u32::<LittleEndian>(*log_id)?;
                buf.write_u32::<LittleEndian>(XLOG_MAGIC)?;
            }
            LogRecord::NewLog { next_log_id } => {
                buf.write_u32::<LittleEndian>(*next_log_id)?;
            }
            LogRecord::DelLog { log_id } => {
                buf.write_u32::<LittleEndian>(*log_id)?;
            }
            LogRecord::NewTab { tab_id } => {
                buf.write_u32::<LittleEndian>(*tab_id)?;
            }
            LogRecord::Commit { xact_id }
            | LogRecord::Abort { xact_id }
            | LogRecord::Cleanup { xact_id } => {
                buf.write_u32::<LittleEndian>(*xact_id)?;
            }
            LogRecord::Mutation { kind, op_seq, tab_id, rec_id, row_id, xact_id, free_rec_id, image } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u32::<LittleEndian>(*row_id)?;
                buf.write_u32::<LittleEndian>(*xact_id)?;
                if kind.is_fl() {
                    buf.write_u32::<LittleEndian>(*free_rec_id)?;
                }
                buf.write_u16::<LittleEndian>(image.len() as u16)?;
                buf.extend_from_slice(image);
            }
            LogRecord::RecFreed { kind: _, op_seq, tab_id, rec_id, xact_id, stat_id, next_rec_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u32::<LittleEndian>(*xact_id)?;
                buf.write_u8(*stat_id)?;
                buf.write_u32::<LittleEndian>(*next_rec_id)?;
            }
            LogRecord::RecRemovedBi { op_seq, tab_id, rec_id, xact_id, stat_id, new_rec_type, next_rec_id, image } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u32::<LittleEndian>(*xact_id)?;
                buf.write_u8(*stat_id)?;
                buf.write_u8(*new_rec_type)?;
                buf.write_u32::<LittleEndian>(*next_rec_id)?;
                buf.write_u16::<LittleEndian>(image.len() as u16)?;
                buf.extend_from_slice(image);
            }
            LogRecord::RecMoved { op_seq, tab_id, rec_id, data_log_id, data_log_offset } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u16::<LittleEndian>(*data_log_id)?;
                buf.write_uint::<LittleEndian>(*data_log_offset, 6)?;
            }
            LogRecord::RecCleaned { op_seq, tab_id, rec_id, status, next_rec_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u8(*status)?;
                buf.write_u32::<LittleEndian>(*next_rec_id)?;
            }
            LogRecord::RecCleaned1 { op_seq, tab_id, rec_id, status } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u8(*status)?;
            }
            LogRecord::RecUnlinked { op_seq, tab_id, rec_id, prev_rec_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
                buf.write_u32::<LittleEndian>(*prev_rec_id)?;
            }
            LogRecord::RowNew { op_seq, tab_id, row_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*row_id)?;
            }
            LogRecord::RowNewFl { op_seq, tab_id, row_id, free_row_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*row_id)?;
                buf.write_u32::<LittleEndian>(*free_row_id)?;
            }
            LogRecord::RowAddRec { op_seq, tab_id, row_id, rec_id }
            | LogRecord::RowSet { op_seq, tab_id, row_id, rec_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*row_id)?;
                buf.write_u32::<LittleEndian>(*rec_id)?;
            }
            LogRecord::RowFreed { op_seq, tab_id, row_id, next_row_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
                buf.write_u32::<LittleEndian>(*row_id)?;
                buf.write_u32::<LittleEndian>(*next_row_id)?;
            }
            LogRecord::OpSync | LogRecord::EndOfLog => {}
            LogRecord::NoOp { op_seq, tab_id } => {
                buf.write_u32::<LittleEndian>(*op_seq)?;
                buf.write_u32::<LittleEndian>(*tab_id)?;
            }
        }

        // 回填checksum
        if wide {
            let ck = checksum_2(&buf[3..], 1);
            buf[1] = (ck & 0xFF) as u8;
            buf[2] = (ck >> 8) as u8;
        } else {
            buf[1] = checksum_1(&buf[2..]);
        }
        Ok(buf)
    }

    /// 从buf头部解码一条记录。
    ///
    /// - `Ok(Some((rec, len)))` 成功, len为消费的字节数;
    /// - `Ok(None)` 字节不足 (尾部截断, 回放在此停止);
    /// - `Err(Corrupt)` 未知类型或checksum不符。
    pub fn decode(buf: &[u8]) -> XResult<Option<(LogRecord, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let t = LogRecordType::try_from(buf[0])
            .map_err(|_| XtError::Corrupt {
                log_id: 0,
                log_offset: 0,
                reason: format!("unknown record type {}.", buf[0]),
            })?;
        let wide = Self::wide_checksum(t);
        let ck_end = if wide { 3 } else { 2 };

        // 定长部分大小 (不含镜像)
        let fixed = ck_end + match t {
            LogRecordType::Header => 10,
            LogRecordType::NewLog | LogRecordType::DelLog | LogRecordType::NewTab
            | LogRecordType::Commit | LogRecordType::Abort | LogRecordType::Cleanup => 4,
            LogRecordType::RecModified
            | LogRecordType::Update | LogRecordType::UpdateBg
            | LogRecordType::Insert | LogRecordType::InsertBg
            | LogRecordType::Delete | LogRecordType::DeleteBg => 22,
            LogRecordType::UpdateFl | LogRecordType::UpdateFlBg
            | LogRecordType::InsertFl | LogRecordType::InsertFlBg
            | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg => 26,
            LogRecordType::RecFreed | LogRecordType::RecRemoved | LogRecordType::RecRemovedExt => 21,
            LogRecordType::RecRemovedBi => 24,
            LogRecordType::RecMoved => 20,
            LogRecordType::RecCleaned => 17,
            LogRecordType::RecCleaned1 => 13,
            LogRecordType::RecUnlinked | LogRecordType::RowNewFl
            | LogRecordType::RowAddRec | LogRecordType::RowSet | LogRecordType::RowFreed => 16,
            LogRecordType::RowNew => 12,
            LogRecordType::OpSync | LogRecordType::EndOfLog => 0,
            LogRecordType::NoOp => 8,
        };
        if buf.len() < fixed {
            return Ok(None);
        }

        // 变长镜像
        let mut total = fixed;
        if matches!(t, LogRecordType::RecModified) || t.base() == LogRecordType::Update
            || t.base() == LogRecordType::Insert || t.base() == LogRecordType::Delete
            || t == LogRecordType::RecRemovedBi
        {
            let size_off = fixed - 2;
            let size = u16::from_le_bytes([buf[size_off], buf[size_off + 1]]) as usize;
            total += size;
            if buf.len() < total {
                return Ok(None);
            }
        }

        // checksum校验
        if wide {
            let stored = u16::from_le_bytes([buf[1], buf[2]]);
            let actual = checksum_2(&buf[3..total], 1);
            if stored != actual {
                return Err(XtError::Corrupt {
                    log_id: 0,
                    log_offset: 0,
                    reason: format!("{} record checksum mismatch.", t.name()),
                });
            }
        } else {
            let actual = checksum_1(&buf[2..total]);
            if buf[1] != actual {
                return Err(XtError::Corrupt {
                    log_id: 0,
                    log_offset: 0,
                    reason: format!("{} record checksum mismatch.", t.name()),
                });
            }
        }

        let mut cur = Cursor::new(&buf[ck_end..total]);
        let rec = match t {
            LogRecordType::Header => {
                let version = cur.read_u16::<LittleEndian>()?;
                let log_id = cur.read_u32::<LittleEndian>()?;
                let magic = cur.read_u32::<LittleEndian>()?;
                if magic != XLOG_MAGIC {
                    return Err(XtError::Corrupt {
                        log_id,
                        log_offset: 0,
                        reason: "bad xlog magic.".to_string(),
                    });
                }
                LogRecord::Header { version, log_id }
            }
            LogRecordType::NewLog => LogRecord::NewLog { next_log_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::DelLog => LogRecord::DelLog { log_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::NewTab => LogRecord::NewTab { tab_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::Commit => LogRecord::Commit { xact_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::Abort => LogRecord::Abort { xact_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::Cleanup => LogRecord::Cleanup { xact_id: cur.read_u32::<LittleEndian>()? },
            LogRecordType::RecModified
            | LogRecordType::Update | LogRecordType::UpdateBg
            | LogRecordType::UpdateFl | LogRecordType::UpdateFlBg
            | LogRecordType::Insert | LogRecordType::InsertBg
            | LogRecordType::InsertFl | LogRecordType::InsertFlBg
            | LogRecordType::Delete | LogRecordType::DeleteBg
            | LogRecordType::DeleteFl | LogRecordType::DeleteFlBg => {
                let op_seq = cur.read_u32::<LittleEndian>()?;
                let tab_id = cur.read_u32::<LittleEndian>()?;
                let rec_id = cur.read_u32::<LittleEndian>()?;
                let row_id = cur.read_u32::<LittleEndian>()?;
                let xact_id = cur.read_u32::<LittleEndian>()?;
                let free_rec_id = if t.is_fl() { cur.read_u32::<LittleEndian>()? } else { 0 };
                let size = cur.read_u16::<LittleEndian>()? as usize;
                let start = ck_end + cur.position() as usize;
                let image = buf[start..start + size].to_vec();
                LogRecord::Mutation { kind: t, op_seq, tab_id, rec_id, row_id, xact_id, free_rec_id, image }
            }
            LogRecordType::RecFreed | LogRecordType::RecRemoved | LogRecordType::RecRemovedExt => {
                LogRecord::RecFreed {
                    kind: t,
                    op_seq: cur.read_u32::<LittleEndian>()?,
                    tab_id: cur.read_u32::<LittleEndian>()?,
                    rec_id: cur.read_u32::<LittleEndian>()?,
                    xact_id: cur.read_u32::<LittleEndian>()?,
                    stat_id: cur.read_u8()?,
                    next_rec_id: cur.read_u32::<LittleEndian>()?,
                }
            }
            LogRecordType::RecRemovedBi => {
                let op_seq = cur.read_u32::<LittleEndian>()?;
                let tab_id = cur.read_u32::<LittleEndian>()?;
                let rec_id = cur.read_u32::<LittleEndian>()?;
                let xact_id = cur.read_u32::<LittleEndian>()?;
                let stat_id = cur.read_u8()?;
                let new_rec_type = cur.read_u8()?;
                let next_rec_id = cur.read_u32::<LittleEndian>()?;
                let size = cur.read_u16::<LittleEndian>()? as usize;
                let start = ck_end + cur.position() as usize;
                let image = buf[start..start + size].to_vec();
                LogRecord::RecRemovedBi { op_seq, tab_id, rec_id, xact_id, stat_id, new_rec_type, next_rec_id, image }
            }
            LogRecordType::RecMoved => LogRecord::RecMoved {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
                data_log_id: cur.read_u16::<LittleEndian>()?,
                data_log_offset: cur.read_uint::<LittleEndian>(6)?,
            },
            LogRecordType::RecCleaned => LogRecord::RecCleaned {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
                status: cur.read_u8()?,
                next_rec_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RecCleaned1 => LogRecord::RecCleaned1 {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
                status: cur.read_u8()?,
            },
            LogRecordType::RecUnlinked => LogRecord::RecUnlinked {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
                prev_rec_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RowNew => LogRecord::RowNew {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                row_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RowNewFl => LogRecord::RowNewFl {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                row_id: cur.read_u32::<LittleEndian>()?,
                free_row_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RowAddRec => LogRecord::RowAddRec {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                row_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RowSet => LogRecord::RowSet {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                row_id: cur.read_u32::<LittleEndian>()?,
                rec_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::RowFreed => LogRecord::RowFreed {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
                row_id: cur.read_u32::<LittleEndian>()?,
                next_row_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::OpSync => LogRecord::OpSync,
            LogRecordType::NoOp => LogRecord::NoOp {
                op_seq: cur.read_u32::<LittleEndian>()?,
                tab_id: cur.read_u32::<LittleEndian>()?,
            },
            LogRecordType::EndOfLog => LogRecord::EndOfLog,
        };

        Ok(Some((rec, total)))
    }
}
