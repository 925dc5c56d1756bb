use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use common::config::XtConfig;
use common::err::engine_error::XtError;
use common::err::XResult;

/// extent头: status(1) + size(4) + tab_id(4) + rec_id(4)
pub const EXTENT_HEADER_SIZE: u64 = 13;

/// extent生命周期
pub const EXT_ACTIVE: u8 = 1;
/// 逻辑删除, 等checkpoint落实
pub const EXT_DELETED: u8 = 2;

/// `<dir>/<data_log_id>.xtd`
pub fn data_log_file_path(dir: &Path, log_id: u32) -> PathBuf {
    dir.join(format!("{}.xtd", log_id))
}

pub fn parse_data_log_file_name(name: &str) -> Option<u32> {
    name.strip_suffix(".xtd")?.parse::<u32>().ok()
}

#[derive(Debug, Default, Clone)]
struct DataLogFile {
    active_count: u32,
    eof: u64,
}

/////////////////////////////////////
/// Data-log manager
///
/// 主记录的大列溢出extent, 存在与xlog平行的编号文件里。
/// 删除分两段: 文件所有extent逻辑删除后进入to_delete;
/// 一次checkpoint把列表写进restart文件后才物理删除,
/// id再经过下一次checkpoint才可复用。
/////////////////////////////////////
pub struct DataLogManager {
    dir: PathBuf,
    threshold: u64,
    files: BTreeMap<u32, DataLogFile>,
    curr_log_id: u32,
    /// 逻辑删空、等待checkpoint落实的文件id
    to_delete: Vec<u32>,
    /// 已物理删除、等待下一次checkpoint后id才可复用
    deleted: Vec<u32>,
}

impl DataLogManager {
    pub fn open(config: &XtConfig) -> XResult<Self> {
        let dir = config.dlog_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let mut files = BTreeMap::new();
        for entry in dir.read_dir()? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = parse_data_log_file_name(name) {
                    let state = Self::scan_file(&data_log_file_path(&dir, id))?;
                    files.insert(id, state);
                }
            }
        }
        let curr_log_id = files.keys().max().copied().unwrap_or(0).max(1);
        let mut mgr = Self {
            dir,
            threshold: config.log_file_threshold(),
            files,
            curr_log_id,
            to_delete: Vec::new(),
            deleted: Vec::new(),
        };
        // 打开时已删空的文件重新排队
        let empty: Vec<u32> = mgr.files.iter()
            .filter(|(_, f)| f.active_count == 0 && f.eof > 0)
            .map(|(id, _)| *id)
            .collect();
        for id in empty {
            mgr.queue_for_delete(id);
        }
        Ok(mgr)
    }

    /// 扫描文件统计活跃extent与eof
    fn scan_file(path: &Path) -> XResult<DataLogFile> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut state = DataLogFile { active_count: 0, eof: len };
        let mut off: u64 = 0;
        while off + EXTENT_HEADER_SIZE <= len {
            file.seek(SeekFrom::Start(off))?;
            let status = file.read_u8()?;
            let size = file.read_u32::<LittleEndian>()?;
            let _tab_id = file.read_u32::<LittleEndian>()?;
            let _rec_id = file.read_u32::<LittleEndian>()?;
            if status == EXT_ACTIVE {
                state.active_count += 1;
            } else if status != EXT_DELETED {
                // 写到一半的尾部extent
                state.eof = off;
                break;
            }
            off += EXTENT_HEADER_SIZE + size as u64;
        }
        Ok(state)
    }

    /// 写入一个extent。 返回 (log_id, offset), offset指向extent头。
    pub fn write(&mut self, data: &[u8], tab_id: u32, rec_id: u32) -> XResult<(u32, u64)> {
        let need = EXTENT_HEADER_SIZE + data.len() as u64;
        let cur_eof = self.files.entry(self.curr_log_id).or_insert_with(DataLogFile::default).eof;
        if cur_eof > 0 && cur_eof + need > self.threshold {
            self.curr_log_id = self.next_fresh_id();
            self.files.insert(self.curr_log_id, DataLogFile::default());
        }
        let log_id = self.curr_log_id;
        let state = self.files.get_mut(&log_id).unwrap();
        let offset = state.eof;

        let path = data_log_file_path(&self.dir, log_id);
        let mut file = OpenOptions::new().write(true).create(true).open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_u8(EXT_ACTIVE)?;
        file.write_u32::<LittleEndian>(data.len() as u32)?;
        file.write_u32::<LittleEndian>(tab_id)?;
        file.write_u32::<LittleEndian>(rec_id)?;
        file.write_all(data)?;

        state.eof = offset + need;
        state.active_count += 1;
        Ok((log_id, offset))
    }

    /// 可复用前的id避让: 跳过deleted/to_delete上的id
    fn next_fresh_id(&self) -> u32 {
        let mut id = self.files.keys().max().copied().unwrap_or(0) + 1;
        while self.deleted.contains(&id) || self.to_delete.contains(&id) {
            id += 1;
        }
        id
    }

    /// 删除一个extent。 幂等:
    /// 文件缺失 -> DataLogNotFound (软); 头不匹配/已删除 -> BadExtRecord (软)。
    pub fn delete(&mut self, log_id: u32, offset: u64, size: u32, tab_id: u32, rec_id: u32) -> XResult<()> {
        let path = data_log_file_path(&self.dir, log_id);
        if !path.exists() {
            return Err(XtError::DataLogNotFound(log_id));
        }
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if offset + EXTENT_HEADER_SIZE > len {
            return Err(XtError::BadExtRecord(format!("extent {}@{} out of bounds.", log_id, offset)));
        }
        file.seek(SeekFrom::Start(offset))?;
        let status = file.read_u8()?;
        let ext_size = file.read_u32::<LittleEndian>()?;
        let ext_tab = file.read_u32::<LittleEndian>()?;
        let ext_rec = file.read_u32::<LittleEndian>()?;

        if ext_size != size || ext_tab != tab_id || ext_rec != rec_id {
            return Err(XtError::BadExtRecord(format!(
                "extent {}@{} does not match tab={} rec={}.", log_id, offset, tab_id, rec_id)));
        }
        if status != EXT_ACTIVE {
            // 重复回放: 已经删过
            return Err(XtError::BadExtRecord(format!("extent {}@{} already deleted.", log_id, offset)));
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_u8(EXT_DELETED)?;

        if let Some(state) = self.files.get_mut(&log_id) {
            state.active_count = state.active_count.saturating_sub(1);
            if state.active_count == 0 {
                self.queue_for_delete(log_id);
            }
        }
        Ok(())
    }

    fn queue_for_delete(&mut self, log_id: u32) {
        if log_id == self.curr_log_id {
            return;
        }
        if !self.to_delete.contains(&log_id) {
            debug!("data log {} fully deleted, queued for checkpoint.", log_id);
            self.to_delete.push(log_id);
            self.to_delete.sort_unstable();
        }
    }

    /// 读extent数据
    pub fn read(&self, log_id: u32, offset: u64) -> XResult<Vec<u8>> {
        let path = data_log_file_path(&self.dir, log_id);
        if !path.exists() {
            return Err(XtError::DataLogNotFound(log_id));
        }
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let status = file.read_u8()?;
        let size = file.read_u32::<LittleEndian>()?;
        let _tab = file.read_u32::<LittleEndian>()?;
        let _rec = file.read_u32::<LittleEndian>()?;
        if status != EXT_ACTIVE {
            return Err(XtError::BadExtRecord(format!("extent {}@{} not active.", log_id, offset)));
        }
        let mut data = vec![0u8; size as usize];
        file.read_exact(&mut data)?;
        Ok(data)
    }

    /// checkpoint写入用的to_delete快照
    pub fn to_delete_snapshot(&self) -> Vec<u32> {
        self.to_delete.clone()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn to_delete_count(&self) -> usize {
        self.to_delete.len()
    }

    /// 上一轮checkpoint后物理删除的文件, 此刻起id可复用
    pub fn forget_deleted(&mut self) {
        self.deleted.clear();
    }

    /// 物理删除一个文件, id转入deleted (直到下次checkpoint)。
    /// 文件已不存在时幂等成功。
    pub fn delete_data_log(&mut self, log_id: u32) -> XResult<()> {
        let path = data_log_file_path(&self.dir, log_id);
        if path.exists() {
            warn!("deleting data log file: {:?}", path);
            fs::remove_file(&path)?;
        }
        self.files.remove(&log_id);
        self.to_delete.retain(|id| *id != log_id);
        if !self.deleted.contains(&log_id) {
            self.deleted.push(log_id);
        }
        Ok(())
    }

    pub fn active_count(&self, log_id: u32) -> u32 {
        self.files.get(&log_id).map(|f| f.active_count).unwrap_or(0)
    }
}
