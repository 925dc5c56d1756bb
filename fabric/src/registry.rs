use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::block::{Block, BlockState};
use crate::block_ref::BlockRef;

pub struct BlockSlot {
    pub block: Box<dyn Block>,
    pub state: BlockState,
}

/// 路由结果
pub enum Route<'a> {
    Slot(&'a mut BlockSlot),
    /// block存在但实例缺失
    NoInstance,
    /// block未注册
    NoBlock,
}

/// 进程级注册表: block number -> instance表 -> handler。
///
/// instance 0 表示"任意/单例", 路由到第一个注册的实例;
/// 非0路由到指定worker, 缺失时由派发器合成 NF_FakeErrorREF 应答。
#[derive(Default)]
pub struct BlockRegistry {
    blocks: HashMap<u16, BTreeMap<u16, BlockSlot>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self { blocks: HashMap::new() }
    }

    pub fn register(&mut self, instance: u16, block: Box<dyn Block>) {
        let block_no = block.block_no();
        let instances = self.blocks.entry(block_no).or_insert_with(BTreeMap::new);
        if instances.contains_key(&instance) {
            warn!("block {:#x} instance {} re-registered.", block_no, instance);
        }
        instances.insert(instance, BlockSlot { block, state: BlockState::Online });
    }

    pub fn route(&mut self, receiver: BlockRef) -> Route<'_> {
        let instances = match self.blocks.get_mut(&receiver.block_no()) {
            Some(m) => m,
            None => return Route::NoBlock,
        };
        if receiver.is_main() {
            // canonical实例
            match instances.values_mut().next() {
                Some(slot) => Route::Slot(slot),
                None => Route::NoInstance,
            }
        } else {
            match instances.get_mut(&receiver.instance()) {
                Some(slot) => Route::Slot(slot),
                None => Route::NoInstance,
            }
        }
    }

    pub fn set_state(&mut self, receiver: BlockRef, state: BlockState) {
        if let Route::Slot(slot) = self.route(receiver) {
            slot.state = state;
        }
    }

    pub fn state_of(&mut self, receiver: BlockRef) -> Option<BlockState> {
        match self.route(receiver) {
            Route::Slot(slot) => Some(slot.state),
            _ => None,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.values().map(|m| m.len()).sum()
    }
}
