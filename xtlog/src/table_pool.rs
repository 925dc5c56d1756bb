use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use common::err::XResult;

use crate::table::Table;

/////////////////////////////////////
/// 打开表句柄缓存。
///
/// 恢复用它把日志记录路由到正确的表文件组; 日志写下之后
/// 被drop的表返回None并记入dropped集合, 避免反复探测目录。
///
/// 单互斥保护 (Database持锁), 表本身单写者。
/////////////////////////////////////
pub struct TablePool {
    tables_dir: PathBuf,
    max_open: usize,
    open: BTreeMap<u32, Table>,
    /// LRU序号
    access: BTreeMap<u32, u64>,
    tick: u64,
    dropped: HashSet<u32>,
}

impl TablePool {
    pub fn new(tables_dir: &Path, max_open: usize) -> Self {
        Self {
            tables_dir: tables_dir.to_path_buf(),
            max_open: max_open.max(1),
            open: BTreeMap::new(),
            access: BTreeMap::new(),
            tick: 0,
            dropped: HashSet::new(),
        }
    }

    /// NEW_TAB路径: 建表文件组并缓存句柄
    pub fn create(&mut self, tab_id: u32) -> XResult<&mut Table> {
        self.dropped.remove(&tab_id);
        if !self.open.contains_key(&tab_id) {
            self.evict_if_full()?;
            let tab = Table::open(&self.tables_dir, tab_id)?;
            info!("table {} created.", tab_id);
            self.open.insert(tab_id, tab);
        }
        self.touch(tab_id);
        Ok(self.open.get_mut(&tab_id).unwrap())
    }

    /// 取表句柄。 表文件不存在 (已drop) 返回None。
    pub fn get(&mut self, tab_id: u32) -> XResult<Option<&mut Table>> {
        if self.dropped.contains(&tab_id) {
            return Ok(None);
        }
        if !self.open.contains_key(&tab_id) {
            let rec_path = Table::tab_file_path(&self.tables_dir, tab_id, "xtr");
            if !rec_path.exists() {
                debug!("table {} not found, remembering as dropped.", tab_id);
                self.dropped.insert(tab_id);
                return Ok(None);
            }
            self.evict_if_full()?;
            let tab = Table::open(&self.tables_dir, tab_id)?;
            self.open.insert(tab_id, tab);
        }
        self.touch(tab_id);
        Ok(self.open.get_mut(&tab_id))
    }

    fn touch(&mut self, tab_id: u32) {
        self.tick += 1;
        self.access.insert(tab_id, self.tick);
    }

    /// 池满时逐出最久未用且无pending op的表 (先flush)
    fn evict_if_full(&mut self) -> XResult<()> {
        while self.open.len() >= self.max_open {
            let victim = self.access.iter()
                .filter(|(id, _)| {
                    self.open.get(id).map(|t| t.pending_count() == 0).unwrap_or(false)
                })
                .min_by_key(|(_, tick)| **tick)
                .map(|(id, _)| *id);
            let victim = match victim {
                Some(v) => v,
                // 全部有pending op: 容忍超限
                None => return Ok(()),
            };
            if let Some(mut tab) = self.open.remove(&victim) {
                debug!("evicting table {} from pool.", victim);
                if tab.flush_pending {
                    tab.flush_data()?;
                }
                if tab.index.is_dirty() {
                    tab.flush_index()?;
                }
            }
            self.access.remove(&victim);
        }
        Ok(())
    }

    /// 当前打开的表id集合
    pub fn open_tab_ids(&self) -> Vec<u32> {
        self.open.keys().copied().collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_dropped(&self, tab_id: u32) -> bool {
        self.dropped.contains(&tab_id)
    }

    /// 全部flush (shutdown/checkpoint NO_PAUSE路径)
    pub fn flush_all(&mut self) -> XResult<()> {
        for tab in self.open.values_mut() {
            if tab.flush_pending {
                tab.flush_data()?;
            }
            if tab.index.is_dirty() {
                tab.flush_index()?;
            }
        }
        Ok(())
    }
}
