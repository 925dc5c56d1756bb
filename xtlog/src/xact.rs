use std::collections::HashMap;
use std::sync::RwLock;

use bitflags::bitflags;

use common::unix_millis;

use crate::op_seq;
use crate::xlog::LogPos;

/// 事务表分段数
pub const XN_NO_OF_SEGMENTS: usize = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XactFlags: u16 {
        const LOGGED    = 0x01;
        const ENDED     = 0x02;
        const COMMITTED = 0x04;
        const CLEANED   = 0x08;
        /// 恢复期materialize的事务
        const RECOVERED = 0x10;
        /// 留给sweeper清理
        const SWEEP     = 0x20;
    }
}

/// 事务描述符。 从第一条logged mutation活到CLEANUP。
#[derive(Debug, Clone)]
pub struct XactData {
    pub id: u32,
    pub flags: XactFlags,
    /// begin-log位置: 该事务第一条记录
    pub begin: LogPos,
    /// 结束时间戳 (毫秒)
    pub end_time: i64,
}

/////////////////////////////////////
/// 事务描述符表。
///
/// 按id低位分段, 每段一把RwLock。 checkpoint的collect阶段
/// 遍历全部段回撤restart position。
/////////////////////////////////////
pub struct XactStore {
    segments: Vec<RwLock<HashMap<u32, XactData>>>,
}

impl XactStore {
    pub fn new() -> Self {
        let mut segments = Vec::with_capacity(XN_NO_OF_SEGMENTS);
        for _ in 0..XN_NO_OF_SEGMENTS {
            segments.push(RwLock::new(HashMap::new()));
        }
        Self { segments }
    }

    #[inline]
    fn segment(&self, xact_id: u32) -> &RwLock<HashMap<u32, XactData>> {
        &self.segments[(xact_id as usize) & (XN_NO_OF_SEGMENTS - 1)]
    }

    /// 事务的第一条logged mutation
    pub fn begin(&self, xact_id: u32, begin: LogPos) {
        let mut seg = self.segment(xact_id).write().unwrap();
        seg.entry(xact_id).or_insert_with(|| XactData {
            id: xact_id,
            flags: XactFlags::LOGGED,
            begin,
            end_time: 0,
        });
    }

    /// BG变体首次见到即宣告事务:
    /// 未知时以 LOGGED|ENDED|RECOVERED|SWEEP materialize, begin指向该记录。
    pub fn materialize_bg(&self, xact_id: u32, pos: LogPos) {
        let mut seg = self.segment(xact_id).write().unwrap();
        seg.entry(xact_id).or_insert_with(|| XactData {
            id: xact_id,
            flags: XactFlags::LOGGED | XactFlags::ENDED | XactFlags::RECOVERED | XactFlags::SWEEP,
            begin: pos,
            end_time: 0,
        });
    }

    /// COMMIT/ABORT: 标记结束。 描述符保留到CLEANUP重放。
    pub fn mark_ended(&self, xact_id: u32, committed: bool) {
        let mut seg = self.segment(xact_id).write().unwrap();
        if let Some(x) = seg.get_mut(&xact_id) {
            x.flags |= XactFlags::ENDED;
            if committed {
                x.flags |= XactFlags::COMMITTED;
            }
            x.end_time = unix_millis();
        }
    }

    /// CLEANUP: 删除描述符
    pub fn cleanup(&self, xact_id: u32) {
        let mut seg = self.segment(xact_id).write().unwrap();
        seg.remove(&xact_id);
    }

    pub fn get(&self, xact_id: u32) -> Option<XactData> {
        let seg = self.segment(xact_id).read().unwrap();
        seg.get(&xact_id).cloned()
    }

    pub fn contains(&self, xact_id: u32) -> bool {
        self.segment(xact_id).read().unwrap().contains_key(&xact_id)
    }

    pub fn count(&self) -> usize {
        self.segments.iter().map(|s| s.read().unwrap().len()).sum()
    }

    /// sweeper用: 已结束事务的快照
    pub fn ended_snapshot(&self) -> Vec<XactData> {
        let mut out = Vec::new();
        for seg in &self.segments {
            let seg = seg.read().unwrap();
            for x in seg.values() {
                if x.flags.contains(XactFlags::ENDED) {
                    out.push(x.clone());
                }
            }
        }
        out
    }

    /// checkpoint collect: 对所有 LOGGED 且未 CLEANED 的事务,
    /// 把restart position回撤到最早的begin位置。
    pub fn retract_restart_pos(&self, mut pos: LogPos) -> LogPos {
        for seg in &self.segments {
            let seg = seg.read().unwrap();
            for x in seg.values() {
                if x.flags.contains(XactFlags::LOGGED) && !x.flags.contains(XactFlags::CLEANED) {
                    if x.begin.is_before(&pos) {
                        pos = x.begin;
                    }
                }
            }
        }
        pos
    }

    /// 已知最大事务id (回绕安全)
    pub fn max_id(&self) -> u32 {
        let mut max: Option<u32> = None;
        for seg in &self.segments {
            let seg = seg.read().unwrap();
            for id in seg.keys() {
                max = Some(match max {
                    None => *id,
                    Some(m) => op_seq::max_seq(m, *id),
                });
            }
        }
        max.unwrap_or(0)
    }
}

impl Default for XactStore {
    fn default() -> Self {
        Self::new()
    }
}
