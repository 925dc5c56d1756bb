use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use common::config::XtConfig;
use common::err::engine_error::XtError;
use common::err::XResult;

use crate::record::{LogRecord, LogRecordType, XLOG_VERSION};

/// 日志位置: (log_id, offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogPos {
    pub log_id: u32,
    pub offset: u64,
}

impl LogPos {
    pub fn new(log_id: u32, offset: u64) -> Self {
        Self { log_id, offset }
    }

    /// 位置比较: 先比log_id再比offset
    pub fn is_before(&self, other: &LogPos) -> bool {
        self.log_id < other.log_id || (self.log_id == other.log_id && self.offset < other.offset)
    }

    pub fn min(self, other: LogPos) -> LogPos {
        if self.is_before(&other) { self } else { other }
    }
}

/// `<dir>/<log_id>.xtl`
pub fn xlog_file_path(dir: &Path, log_id: u32) -> PathBuf {
    dir.join(format!("{}.xtl", log_id))
}

/// 解析文件名: `<log_id>.xtl`
pub fn parse_xlog_file_name(name: &str) -> Option<u32> {
    let id = name.strip_suffix(".xtl")?;
    id.parse::<u32>().ok()
}

/// 目录下所有日志文件id, 升序
pub fn list_log_ids(dir: &Path) -> XResult<Vec<u32>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in dir.read_dir()? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(id) = parse_xlog_file_name(name) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/////////////////////////////////////
/// Xlog writer
///
/// 顺序追加记录到编号日志文件。 每个文件以HEADER记录开头,
/// 跨过阈值时写NEW_LOG并滚动到下一个文件。
///
/// 两个逻辑位置:
/// - write head: 持久追加点 (write返回即占位)
/// - flush head: 保证已落盘的位置, 单调不回退
///
/// 写者竞争一个monitor (Database持有Mutex<XlogWriter>);
/// write返回顺序即on-disk顺序。
/////////////////////////////////////
pub struct XlogWriter {
    dir: PathBuf,
    threshold: u64,
    buffer_size: usize,
    file: File,
    write_head: LogPos,
    flush_head: LogPos,
    /// 恢复仍需要的最低文件id
    min_log_id: u32,
    /// buffer中未flush的字节
    unflushed: u64,
}

impl XlogWriter {
    /// 在指定位置打开writer。 位置之后的字节视为不可达尾部, 截掉。
    pub fn open(config: &XtConfig, start: LogPos) -> XResult<Self> {
        let dir = config.xlog_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let min_log_id = list_log_ids(&dir)?.first().copied().unwrap_or(start.log_id);

        let path = xlog_file_path(&dir, start.log_id);
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let mut writer = Self {
            dir,
            threshold: config.log_file_threshold(),
            buffer_size: config.log_buffer_size(),
            file,
            write_head: start,
            flush_head: start,
            min_log_id,
            unflushed: 0,
        };
        if start.offset == 0 {
            writer.file.set_len(0)?;
            writer.append_header(start.log_id)?;
        } else {
            // 丢弃崩溃留下的不完整尾部
            writer.file.set_len(start.offset)?;
            writer.file.seek(SeekFrom::Start(start.offset))?;
        }
        Ok(writer)
    }

    fn append_header(&mut self, log_id: u32) -> XResult<()> {
        let header = LogRecord::Header { version: XLOG_VERSION, log_id };
        let bytes = header.encode()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        self.write_head = LogPos::new(log_id, bytes.len() as u64);
        self.unflushed += bytes.len() as u64;
        Ok(())
    }

    /// 追加一条记录。 返回其日志位置。
    pub fn write(&mut self, record: &LogRecord) -> XResult<LogPos> {
        let bytes = record.encode()?;

        if self.write_head.offset + bytes.len() as u64 > self.threshold {
            self.roll_over()?;
        }

        let pos = self.write_head;
        self.file.write_all(&bytes)?;
        self.write_head.offset += bytes.len() as u64;
        self.unflushed += bytes.len() as u64;

        // 缓冲写满即落盘
        if self.unflushed >= self.buffer_size as u64 {
            self.flush_all()?;
        }
        Ok(pos)
    }

    /// 写NEW_LOG并滚动到下一个文件
    fn roll_over(&mut self) -> XResult<()> {
        let next_log_id = self.write_head.log_id + 1;
        let rec = LogRecord::NewLog { next_log_id };
        let bytes = rec.encode()?;
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;

        info!("xlog roll over: {} -> {}.", self.write_head.log_id, next_log_id);

        let path = xlog_file_path(&self.dir, next_log_id);
        self.file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        self.file.set_len(0)?;
        self.unflushed = 0;
        self.flush_head = LogPos::new(next_log_id, 0);
        self.append_header(next_log_id)?;
        Ok(())
    }

    /// 幂等: flush head不回退。
    pub fn flush_up_to(&mut self, pos: LogPos) -> XResult<()> {
        if !self.flush_head.is_before(&pos) {
            return Ok(());
        }
        self.flush_all()
    }

    fn flush_all(&mut self) -> XResult<()> {
        self.file.sync_all()?;
        self.flush_head = self.write_head;
        self.unflushed = 0;
        Ok(())
    }

    pub fn write_head(&self) -> LogPos {
        self.write_head
    }

    pub fn flush_head(&self) -> LogPos {
        self.flush_head
    }

    pub fn min_log_id(&self) -> u32 {
        self.min_log_id
    }

    /// checkpoint retire后推进最低文件id
    pub fn set_min_log_id(&mut self, id: u32) {
        if id > self.min_log_id {
            self.min_log_id = id;
        }
    }

    /// 删除一个日志文件 (checkpoint retire路径)
    pub fn delete_log(&mut self, log_id: u32) -> XResult<bool> {
        if log_id >= self.write_head.log_id {
            return Err(XtError::Bug(format!("refusing to delete active log {}.", log_id)));
        }
        let path = xlog_file_path(&self.dir, log_id);
        if !path.exists() {
            return Ok(false);
        }
        warn!("deleting xlog file: {:?}", path);
        fs::remove_file(path)?;
        Ok(true)
    }
}

/////////////////////////////////////
/// 顺序扫描reader。 跟随NEW_LOG切换文件, 在END_OF_LOG、
/// 文件尾、截断尾部或checksum失败处干净停住。
/////////////////////////////////////
pub struct XlogReader {
    dir: PathBuf,
    buf: Vec<u8>,
    pos: LogPos,
    cursor: usize,
    bytes_read: u64,
    /// 尾部损坏处停止的标志
    tail_corrupt: bool,
    done: bool,
}

impl XlogReader {
    pub fn open(dir: &Path, start: LogPos) -> XResult<Self> {
        let mut reader = Self {
            dir: dir.to_path_buf(),
            buf: Vec::new(),
            pos: start,
            cursor: 0,
            bytes_read: 0,
            tail_corrupt: false,
            done: false,
        };
        reader.load_file(start.log_id, start.offset)?;
        Ok(reader)
    }

    fn load_file(&mut self, log_id: u32, offset: u64) -> XResult<()> {
        let path = xlog_file_path(&self.dir, log_id);
        if !path.exists() {
            self.buf.clear();
            self.cursor = 0;
            self.pos = LogPos::new(log_id, offset);
            self.done = true;
            return Ok(());
        }
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.buf = buf;
        self.cursor = offset as usize;
        self.pos = LogPos::new(log_id, offset);
        self.done = self.cursor >= self.buf.len();
        Ok(())
    }

    /// 要读的总字节数 (进度打印用): 从当前位置到最后一个文件尾
    pub fn bytes_to_read(&self) -> XResult<u64> {
        let ids = list_log_ids(&self.dir)?;
        let mut total: u64 = 0;
        for id in ids {
            if id < self.pos.log_id {
                continue;
            }
            let len = fs::metadata(xlog_file_path(&self.dir, id))?.len();
            if id == self.pos.log_id {
                total += len.saturating_sub(self.pos.offset);
            } else {
                total += len;
            }
        }
        Ok(total)
    }

    /// 下一条记录及其位置。 None表示回放到此为止。
    pub fn next(&mut self) -> XResult<Option<(LogRecord, LogPos)>> {
        if self.done {
            return Ok(None);
        }
        let at = LogPos::new(self.pos.log_id, self.cursor as u64);
        let slice = &self.buf[self.cursor..];
        match LogRecord::decode(slice) {
            Ok(Some((rec, used))) => {
                self.cursor += used;
                self.bytes_read += used as u64;
                self.pos.offset = self.cursor as u64;
                match rec {
                    LogRecord::NewLog { next_log_id } => {
                        // 剩余尾部属于下一个文件之前的填充, 直接切换
                        self.bytes_read += (self.buf.len() - self.cursor) as u64;
                        self.load_file(next_log_id, 0)?;
                        Ok(Some((rec, at)))
                    }
                    LogRecord::EndOfLog => {
                        self.done = true;
                        Ok(Some((rec, at)))
                    }
                    _ => Ok(Some((rec, at))),
                }
            }
            Ok(None) => {
                if !slice.is_empty() {
                    warn!("partial record at {}-{}, replay stops here.", at.log_id, at.offset);
                    self.tail_corrupt = true;
                }
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                // 结构损坏: 停在最后一条好记录
                warn!("corrupt record at {}-{}: {}. replay stops here.", at.log_id, at.offset, e);
                self.tail_corrupt = true;
                self.done = true;
                Ok(None)
            }
        }
    }

    /// 最后一条好记录之后的位置
    pub fn position(&self) -> LogPos {
        self.pos
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn tail_corrupt(&self) -> bool {
        self.tail_corrupt
    }
}
