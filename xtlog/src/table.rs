use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::index::{Index, DEFAULT_KEY_LEN};
use crate::op_seq;
use crate::record::LogRecord;
use crate::xlog::LogPos;

/// 空引用。 rec/row id从0起, 0是有效id, 所以链表终止符用NIL。
pub const NIL_ID: u32 = 0xFFFF_FFFF;

/// 记录槽大小 (固定槽)
pub const REC_SLOT_SIZE: u64 = 128;
/// 记录头: status(1) stat_id(1) prev_rec(4) xact(4) row(4)
pub const REC_HEADER_SIZE: usize = 14;
/// 扩展记录指针在槽内偏移: data_log_id(2) + data_log_offset(6)
pub const EXT_PTR_OFFSET: u64 = 14;
/// 扩展数据大小字段偏移
pub const EXT_SIZE_OFFSET: u64 = 22;
/// 行槽: u32引用
pub const ROW_SLOT_SIZE: u64 = 4;
/// .xtr文件头大小
pub const TAB_FILE_HEADER_SIZE: u64 = 64;
pub const XTR_MAGIC: u32 = 0x58545242;

/// 记录状态字节
pub const TAB_STATUS_FREED: u8 = 0;
pub const TAB_STATUS_DELETE: u8 = 1;
pub const TAB_STATUS_FIXED: u8 = 2;
pub const TAB_STATUS_VARIABLE: u8 = 3;
pub const TAB_STATUS_EXT_DLOG: u8 = 4;
pub const TAB_STATUS_MASK: u8 = 0x0F;
/// sweeper确认提交后置位
pub const TAB_STATUS_CLEANED_BIT: u8 = 0x80;

/// op列表的bug阈值
const MAX_QUEUED_OPS: usize = 1_000_000;

#[inline]
pub fn rec_is_free(status: u8) -> bool {
    (status & TAB_STATUS_MASK) == TAB_STATUS_FREED
}

#[inline]
pub fn rec_is_ext(status: u8) -> bool {
    (status & TAB_STATUS_MASK) == TAB_STATUS_EXT_DLOG
}

/// 记录头 (槽内前14字节)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHead {
    pub status: u8,
    pub stat_id: u8,
    /// 行链上更老记录的引用
    pub prev_rec_id: u32,
    pub xact_id: u32,
    pub row_id: u32,
}

impl RecHead {
    pub fn encode(&self) -> [u8; REC_HEADER_SIZE] {
        let mut b = [0u8; REC_HEADER_SIZE];
        b[0] = self.status;
        b[1] = self.stat_id;
        b[2..6].copy_from_slice(&self.prev_rec_id.to_le_bytes());
        b[6..10].copy_from_slice(&self.xact_id.to_le_bytes());
        b[10..14].copy_from_slice(&self.row_id.to_le_bytes());
        b
    }

    pub fn decode(b: &[u8]) -> XResult<RecHead> {
        if b.len() < REC_HEADER_SIZE {
            return Err(XtError::Error(format!("record header truncated: {} bytes.", b.len())));
        }
        Ok(RecHead {
            status: b[0],
            stat_id: b[1],
            prev_rec_id: u32::from_le_bytes([b[2], b[3], b[4], b[5]]),
            xact_id: u32::from_le_bytes([b[6], b[7], b[8], b[9]]),
            row_id: u32::from_le_bytes([b[10], b[11], b[12], b[13]]),
        })
    }
}

/// 失序到达、等待按序应用的操作
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub op_seq: u32,
    pub pos: LogPos,
    pub record: LogRecord,
}

/////////////////////////////////////
/// 表打开状态。
///
/// 文件组: `<tab_id>.xtr` 记录文件 (头64字节 + 固定槽),
/// `<tab_id>.xtd` 行文件 (u32槽), `<tab_id>.xti` 索引。
/// 表头持久化各free/eof头与op-seq头, checkpoint flush时落盘。
///
/// 单线程修改: 恢复期是applier, 运行期是writer。
/////////////////////////////////////
pub struct Table {
    pub tab_id: u32,
    rec_file: File,
    row_file: File,
    rec_path: PathBuf,
    index_path: PathBuf,
    pub index: Index,

    pub head_rec_eof_id: u32,
    pub head_rec_free_id: u32,
    pub head_rec_fnum: u32,
    pub head_row_eof_id: u32,
    pub head_row_free_id: u32,
    pub head_row_fnum: u32,
    /// 最后按序应用的op
    pub head_op_seq: u32,

    /// head_op_seq的不回绕影子, pending排序键的基准
    virt_head: u64,
    pending: BTreeMap<u64, PendingOp>,

    pub bytes_to_flush: u64,
    pub flush_pending: bool,
    /// 恢复期首条op到达时对齐head并置位
    pub recovery_done: bool,
}

impl Table {
    pub fn tab_file_path(dir: &Path, tab_id: u32, ext: &str) -> PathBuf {
        dir.join(format!("{}.{}", tab_id, ext))
    }

    pub fn open(tables_dir: &Path, tab_id: u32) -> XResult<Table> {
        if !tables_dir.exists() {
            std::fs::create_dir_all(tables_dir)?;
        }
        let rec_path = Self::tab_file_path(tables_dir, tab_id, "xtr");
        let row_path = Self::tab_file_path(tables_dir, tab_id, "xtd");
        let index_path = Self::tab_file_path(tables_dir, tab_id, "xti");

        let fresh = !rec_path.exists();
        let rec_file = OpenOptions::new().read(true).write(true).create(true).open(&rec_path)?;
        let row_file = OpenOptions::new().read(true).write(true).create(true).open(&row_path)?;
        let index = Index::load(&index_path, DEFAULT_KEY_LEN)?;

        let mut tab = Table {
            tab_id,
            rec_file,
            row_file,
            rec_path,
            index_path,
            index,
            head_rec_eof_id: 0,
            head_rec_free_id: NIL_ID,
            head_rec_fnum: 0,
            head_row_eof_id: 0,
            head_row_free_id: NIL_ID,
            head_row_fnum: 0,
            head_op_seq: 0,
            virt_head: 0,
            pending: BTreeMap::new(),
            bytes_to_flush: 0,
            flush_pending: false,
            recovery_done: false,
        };
        if fresh {
            tab.write_header()?;
        } else {
            tab.read_header()?;
        }
        Ok(tab)
    }

    fn read_header(&mut self) -> XResult<()> {
        self.rec_file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; TAB_FILE_HEADER_SIZE as usize];
        match self.rec_file.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // 空文件: 当新表
                return self.write_header();
            }
            Err(e) => return Err(e.into()),
        }
        let mut cur = std::io::Cursor::new(&buf[..]);
        let magic = cur.read_u32::<LittleEndian>()?;
        if magic != XTR_MAGIC {
            return Err(XtError::Corrupt {
                log_id: 0,
                log_offset: 0,
                reason: format!("bad table magic in {:?}.", self.rec_path),
            });
        }
        let _version = cur.read_u16::<LittleEndian>()?;
        let _pad = cur.read_u16::<LittleEndian>()?;
        self.head_rec_eof_id = cur.read_u32::<LittleEndian>()?;
        self.head_rec_free_id = cur.read_u32::<LittleEndian>()?;
        self.head_rec_fnum = cur.read_u32::<LittleEndian>()?;
        self.head_row_eof_id = cur.read_u32::<LittleEndian>()?;
        self.head_row_free_id = cur.read_u32::<LittleEndian>()?;
        self.head_row_fnum = cur.read_u32::<LittleEndian>()?;
        self.head_op_seq = cur.read_u32::<LittleEndian>()?;
        self.virt_head = self.head_op_seq as u64;
        Ok(())
    }

    fn write_header(&mut self) -> XResult<()> {
        let mut buf = Vec::with_capacity(TAB_FILE_HEADER_SIZE as usize);
        buf.write_u32::<LittleEndian>(XTR_MAGIC)?;
        buf.write_u16::<LittleEndian>(1)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.head_rec_eof_id)?;
        buf.write_u32::<LittleEndian>(self.head_rec_free_id)?;
        buf.write_u32::<LittleEndian>(self.head_rec_fnum)?;
        buf.write_u32::<LittleEndian>(self.head_row_eof_id)?;
        buf.write_u32::<LittleEndian>(self.head_row_free_id)?;
        buf.write_u32::<LittleEndian>(self.head_row_fnum)?;
        buf.write_u32::<LittleEndian>(self.head_op_seq)?;
        buf.resize(TAB_FILE_HEADER_SIZE as usize, 0);
        self.rec_file.seek(SeekFrom::Start(0))?;
        self.rec_file.write_all(&buf)?;
        Ok(())
    }

    #[inline]
    fn rec_offset(rec_id: u32) -> u64 {
        TAB_FILE_HEADER_SIZE + rec_id as u64 * REC_SLOT_SIZE
    }

    #[inline]
    fn row_offset(row_id: u32) -> u64 {
        row_id as u64 * ROW_SLOT_SIZE
    }

    /// 读记录槽前len字节。 文件之外的部分零填充。
    pub fn read_rec(&mut self, rec_id: u32, len: usize) -> XResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let off = Self::rec_offset(rec_id);
        let file_len = self.rec_file.metadata()?.len();
        if off >= file_len {
            return Ok(buf);
        }
        let avail = ((file_len - off) as usize).min(len);
        self.rec_file.seek(SeekFrom::Start(off))?;
        self.rec_file.read_exact(&mut buf[..avail])?;
        Ok(buf)
    }

    pub fn read_rec_head(&mut self, rec_id: u32) -> XResult<RecHead> {
        let buf = self.read_rec(rec_id, REC_HEADER_SIZE)?;
        RecHead::decode(&buf)
    }

    /// 把after-image写进记录槽
    pub fn write_rec(&mut self, rec_id: u32, image: &[u8]) -> XResult<()> {
        if image.len() as u64 > REC_SLOT_SIZE {
            return Err(XtError::Bug(format!("record image {} exceeds slot size.", image.len())));
        }
        self.rec_file.seek(SeekFrom::Start(Self::rec_offset(rec_id)))?;
        self.rec_file.write_all(image)?;
        self.bytes_to_flush += image.len() as u64;
        self.flush_pending = true;
        Ok(())
    }

    /// 写free槽: status=FREED, stat_id, next链
    pub fn write_free_slot(&mut self, rec_id: u32, stat_id: u8, next_rec_id: u32) -> XResult<()> {
        let mut buf = [0u8; 6];
        buf[0] = TAB_STATUS_FREED;
        buf[1] = stat_id;
        buf[2..6].copy_from_slice(&next_rec_id.to_le_bytes());
        self.rec_file.seek(SeekFrom::Start(Self::rec_offset(rec_id)))?;
        self.rec_file.write_all(&buf)?;
        self.bytes_to_flush += 6;
        self.flush_pending = true;
        Ok(())
    }

    /// free槽的next链 (偏移2处的u32)
    pub fn read_free_next(&mut self, rec_id: u32) -> XResult<u32> {
        let buf = self.read_rec(rec_id, 6)?;
        Ok(u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]))
    }

    pub fn write_status(&mut self, rec_id: u32, status: u8) -> XResult<()> {
        self.rec_file.seek(SeekFrom::Start(Self::rec_offset(rec_id)))?;
        self.rec_file.write_all(&[status])?;
        self.bytes_to_flush += 1;
        self.flush_pending = true;
        Ok(())
    }

    /// 行链prev指针 (记录头偏移2处)
    pub fn write_prev_link(&mut self, rec_id: u32, prev_rec_id: u32) -> XResult<()> {
        self.rec_file.seek(SeekFrom::Start(Self::rec_offset(rec_id) + 2))?;
        self.rec_file.write_all(&prev_rec_id.to_le_bytes())?;
        self.bytes_to_flush += 4;
        self.flush_pending = true;
        Ok(())
    }

    /// 重写8字节扩展记录指针
    pub fn write_ext_ptr(&mut self, rec_id: u32, data_log_id: u16, data_log_offset: u64) -> XResult<()> {
        self.rec_file.seek(SeekFrom::Start(Self::rec_offset(rec_id) + EXT_PTR_OFFSET))?;
        self.rec_file.write_u16::<LittleEndian>(data_log_id)?;
        self.rec_file.write_uint::<LittleEndian>(data_log_offset, 6)?;
        self.bytes_to_flush += 8;
        self.flush_pending = true;
        Ok(())
    }

    /// 读扩展记录引用: (data_log_id, data_log_offset, size)
    pub fn read_ext_ref(&mut self, rec_id: u32) -> XResult<(u16, u64, u32)> {
        let buf = self.read_rec(rec_id, (EXT_SIZE_OFFSET + 4) as usize)?;
        let mut cur = std::io::Cursor::new(&buf[EXT_PTR_OFFSET as usize..]);
        let log_id = cur.read_u16::<LittleEndian>()?;
        let offset = cur.read_uint::<LittleEndian>(6)?;
        let size = cur.read_u32::<LittleEndian>()?;
        Ok((log_id, offset, size))
    }

    /// 行槽值。 文件之外返回NIL。
    pub fn row_get(&mut self, row_id: u32) -> XResult<u32> {
        let off = Self::row_offset(row_id);
        let file_len = self.row_file.metadata()?.len();
        if off + ROW_SLOT_SIZE > file_len {
            return Ok(NIL_ID);
        }
        self.row_file.seek(SeekFrom::Start(off))?;
        Ok(self.row_file.read_u32::<LittleEndian>()?)
    }

    pub fn row_set(&mut self, row_id: u32, ref_id: u32) -> XResult<()> {
        self.row_file.seek(SeekFrom::Start(Self::row_offset(row_id)))?;
        self.row_file.write_u32::<LittleEndian>(ref_id)?;
        self.bytes_to_flush += ROW_SLOT_SIZE;
        self.flush_pending = true;
        Ok(())
    }

    /// flush记录/行文件 (含表头)
    pub fn flush_data(&mut self) -> XResult<()> {
        self.write_header()?;
        self.rec_file.sync_all()?;
        self.row_file.sync_all()?;
        self.bytes_to_flush = 0;
        self.flush_pending = false;
        Ok(())
    }

    pub fn flush_index(&mut self) -> XResult<()> {
        let path = self.index_path.clone();
        self.index.flush(&path)
    }

    //////////////////////
    // pending op队列
    //////////////////////

    /// pending排序键: head影子 + 与head的回绕距离。
    /// 同一op无论何时入队, 键值一致。
    fn pending_key(&self, op: u32) -> u64 {
        self.virt_head + op_seq::distance(op, self.head_op_seq) as u64
    }

    pub fn queue_op(&mut self, op: PendingOp) -> XResult<()> {
        if self.pending.len() >= MAX_QUEUED_OPS {
            return Err(XtError::Bug(format!(
                "table {} op list exceeded {} entries.", self.tab_id, MAX_QUEUED_OPS)));
        }
        debug_assert!(op_seq::distance(op.op_seq, self.head_op_seq) < 0x8000_0000);
        let key = self.pending_key(op.op_seq);
        self.pending.insert(key, op);
        Ok(())
    }

    /// 记下一条已应用的op, 推进head
    pub fn note_applied(&mut self, op: u32) {
        let d = op_seq::distance(op, self.head_op_seq) as u64;
        self.virt_head += d;
        self.head_op_seq = op;
    }

    /// 恢复期重放到早于表头的位置时对齐head (表flush领先checkpoint)
    pub fn align_recovery_head(&mut self, first_op: u32) {
        if !self.recovery_done {
            if op_seq::is_before(first_op.wrapping_sub(1), self.head_op_seq) {
                self.head_op_seq = first_op.wrapping_sub(1);
                self.virt_head = self.head_op_seq as u64;
            }
            self.recovery_done = true;
        }
    }

    /// 恰好衔接head的pending op
    pub fn pop_next_in_seq(&mut self) -> Option<PendingOp> {
        let next_key = self.virt_head + 1;
        let is_next = self.pending.keys().next() == Some(&next_key);
        if is_next {
            self.pending.remove(&next_key)
        } else {
            None
        }
    }

    /// 失序清算: 取走全部pending (按op序)
    pub fn take_all_pending(&mut self) -> Vec<PendingOp> {
        let out: Vec<PendingOp> = std::mem::take(&mut self.pending).into_values().collect();
        out
    }

    /// 队首op的日志位置 (checkpoint回撤restart position用)
    pub fn head_pending_pos(&self) -> Option<LogPos> {
        self.pending.first_key_value().map(|(_, op)| op.pos)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("table_test_{}", tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_header_round_trip() {
        let dir = temp_dir("header");
        {
            let mut tab = Table::open(&dir, 1).unwrap();
            tab.head_rec_eof_id = 5;
            tab.head_rec_free_id = 2;
            tab.head_rec_fnum = 1;
            tab.head_row_eof_id = 3;
            tab.head_op_seq = 42;
            tab.flush_data().unwrap();
        }
        let tab = Table::open(&dir, 1).unwrap();
        assert_eq!(tab.head_rec_eof_id, 5);
        assert_eq!(tab.head_rec_free_id, 2);
        assert_eq!(tab.head_rec_fnum, 1);
        assert_eq!(tab.head_row_eof_id, 3);
        assert_eq!(tab.head_op_seq, 42);
        assert_eq!(tab.head_row_free_id, NIL_ID);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rec_slot_io() {
        let dir = temp_dir("rec_io");
        let mut tab = Table::open(&dir, 1).unwrap();

        let head = RecHead {
            status: TAB_STATUS_FIXED,
            stat_id: 1,
            prev_rec_id: NIL_ID,
            xact_id: 10,
            row_id: 0,
        };
        let mut image = head.encode().to_vec();
        image.extend_from_slice(b"payload!");
        tab.write_rec(0, &image).unwrap();

        let back = tab.read_rec_head(0).unwrap();
        assert_eq!(back, head);
        let full = tab.read_rec(0, image.len()).unwrap();
        assert_eq!(&full[REC_HEADER_SIZE..], b"payload!");

        // 未写过的槽零填充
        let empty = tab.read_rec(9, 8).unwrap();
        assert_eq!(empty, vec![0u8; 8]);

        tab.write_status(0, TAB_STATUS_FIXED | TAB_STATUS_CLEANED_BIT).unwrap();
        assert_eq!(tab.read_rec_head(0).unwrap().status & TAB_STATUS_CLEANED_BIT, TAB_STATUS_CLEANED_BIT);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_free_slot_and_links() {
        let dir = temp_dir("free");
        let mut tab = Table::open(&dir, 1).unwrap();
        tab.write_free_slot(3, 0, NIL_ID).unwrap();
        tab.write_free_slot(4, 0, 3).unwrap();
        assert_eq!(tab.read_free_next(4).unwrap(), 3);
        assert_eq!(tab.read_free_next(3).unwrap(), NIL_ID);
        assert!(rec_is_free(tab.read_rec_head(3).unwrap().status));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ext_ptr() {
        let dir = temp_dir("ext");
        let mut tab = Table::open(&dir, 1).unwrap();
        let head = RecHead {
            status: TAB_STATUS_EXT_DLOG,
            stat_id: 0,
            prev_rec_id: NIL_ID,
            xact_id: 1,
            row_id: 0,
        };
        let mut image = head.encode().to_vec();
        image.extend_from_slice(&2u16.to_le_bytes());
        image.extend_from_slice(&100u64.to_le_bytes()[..6]);
        image.extend_from_slice(&64u32.to_le_bytes());
        tab.write_rec(0, &image).unwrap();

        assert_eq!(tab.read_ext_ref(0).unwrap(), (2, 100, 64));
        tab.write_ext_ptr(0, 3, 777).unwrap();
        assert_eq!(tab.read_ext_ref(0).unwrap(), (3, 777, 64));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_row_slots() {
        let dir = temp_dir("row");
        let mut tab = Table::open(&dir, 1).unwrap();
        assert_eq!(tab.row_get(0).unwrap(), NIL_ID);
        tab.row_set(0, 7).unwrap();
        tab.row_set(2, 9).unwrap();
        assert_eq!(tab.row_get(0).unwrap(), 7);
        assert_eq!(tab.row_get(2).unwrap(), 9);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pending_queue_order() {
        let dir = temp_dir("pending");
        let mut tab = Table::open(&dir, 1).unwrap();

        let mk = |op: u32| PendingOp {
            op_seq: op,
            pos: LogPos::new(1, op as u64 * 10),
            record: LogRecord::NoOp { op_seq: op, tab_id: 1 },
        };

        // head=0; op 3,2失序到达
        tab.queue_op(mk(3)).unwrap();
        tab.queue_op(mk(2)).unwrap();
        assert_eq!(tab.pending_count(), 2);
        assert_eq!(tab.head_pending_pos().unwrap(), LogPos::new(1, 20));
        assert!(tab.pop_next_in_seq().is_none());

        // op 1应用后, 2、3依次衔接
        tab.note_applied(1);
        let p2 = tab.pop_next_in_seq().unwrap();
        assert_eq!(p2.op_seq, 2);
        tab.note_applied(2);
        let p3 = tab.pop_next_in_seq().unwrap();
        assert_eq!(p3.op_seq, 3);
        tab.note_applied(3);
        assert_eq!(tab.pending_count(), 0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_align_recovery_head() {
        let dir = temp_dir("align");
        let mut tab = Table::open(&dir, 1).unwrap();
        tab.head_op_seq = 100;
        tab.virt_head = 100;

        // checkpoint位置早于表flush: 首条op=51 -> head回落到50
        tab.align_recovery_head(51);
        assert_eq!(tab.head_op_seq, 50);
        assert!(tab.recovery_done);

        // 只对齐一次
        tab.align_recovery_head(10);
        assert_eq!(tab.head_op_seq, 50);

        fs::remove_dir_all(&dir).ok();
    }
}
