use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::warn;

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::table::REC_HEADER_SIZE;

/// .xti文件magic
pub const XTI_MAGIC: u32 = 0x58544958;
pub const XTI_VERSION: u16 = 1;
/// 默认索引键长 (记录数据前缀)
pub const DEFAULT_KEY_LEN: u16 = 8;

/////////////////////////////////////
/// 表索引。
///
/// 恢复redo所需的最小索引: 键 -> (row, rec) 集合, 整体载入
/// 内存, flush时重写.xti文件。 B-tree布局不在范围内。
/////////////////////////////////////
pub struct Index {
    key_len: u16,
    entries: BTreeMap<Vec<u8>, BTreeSet<(u32, u32)>>,
    /// redo遇到结构性错误后置位; 回放继续, 索引待重建
    corrupted: bool,
    dirty: bool,
}

impl Index {
    pub fn new(key_len: u16) -> Self {
        Self {
            key_len,
            entries: BTreeMap::new(),
            corrupted: false,
            dirty: false,
        }
    }

    /// 从.xti加载; 文件缺失时返回空索引
    pub fn load(path: &Path, default_key_len: u16) -> XResult<Self> {
        if !path.exists() {
            return Ok(Self::new(default_key_len));
        }
        let mut file = File::open(path)?;
        let magic = file.read_u32::<LittleEndian>()?;
        if magic != XTI_MAGIC {
            warn!("bad index magic in {:?}, starting empty.", path);
            return Ok(Self::new(default_key_len));
        }
        let _version = file.read_u16::<LittleEndian>()?;
        let key_len = file.read_u16::<LittleEndian>()?;
        let count = file.read_u32::<LittleEndian>()?;
        let mut index = Self::new(key_len);
        for _ in 0..count {
            let mut key = vec![0u8; key_len as usize];
            file.read_exact(&mut key)?;
            let row_id = file.read_u32::<LittleEndian>()?;
            let rec_id = file.read_u32::<LittleEndian>()?;
            index.entries.entry(key).or_insert_with(BTreeSet::new).insert((row_id, rec_id));
        }
        Ok(index)
    }

    pub fn flush(&mut self, path: &Path) -> XResult<()> {
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        file.write_u32::<LittleEndian>(XTI_MAGIC)?;
        file.write_u16::<LittleEndian>(XTI_VERSION)?;
        file.write_u16::<LittleEndian>(self.key_len)?;
        let count: u32 = self.entries.values().map(|s| s.len() as u32).sum();
        file.write_u32::<LittleEndian>(count)?;
        for (key, set) in &self.entries {
            for (row_id, rec_id) in set {
                file.write_all(key)?;
                file.write_u32::<LittleEndian>(*row_id)?;
                file.write_u32::<LittleEndian>(*rec_id)?;
            }
        }
        file.sync_all()?;
        self.dirty = false;
        Ok(())
    }

    /// 从记录镜像提取索引键: 跳过记录头, 取key_len字节前缀 (零填充)
    pub fn key_from_image(&self, image: &[u8]) -> Vec<u8> {
        let mut key = vec![0u8; self.key_len as usize];
        if image.len() > REC_HEADER_SIZE {
            let data = &image[REC_HEADER_SIZE..];
            let n = data.len().min(self.key_len as usize);
            key[..n].copy_from_slice(&data[..n]);
        }
        key
    }

    pub fn insert(&mut self, key: Vec<u8>, row_id: u32, rec_id: u32) -> XResult<()> {
        if key.len() != self.key_len as usize {
            return Err(XtError::Bug(format!("index key length {} != {}.", key.len(), self.key_len)));
        }
        self.entries.entry(key).or_insert_with(BTreeSet::new).insert((row_id, rec_id));
        self.dirty = true;
        Ok(())
    }

    /// 幂等: 不存在的entry直接返回
    pub fn remove(&mut self, key: &[u8], rec_id: u32) {
        if let Some(set) = self.entries.get_mut(key) {
            set.retain(|(_, r)| *r != rec_id);
            if set.is_empty() {
                self.entries.remove(key);
            }
            self.dirty = true;
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Vec<(u32, u32)> {
        self.entries.get(key).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|s| s.len()).sum()
    }

    pub fn key_len(&self) -> u16 {
        self.key_len
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_corrupted(&mut self) {
        self.corrupted = true;
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }
}
