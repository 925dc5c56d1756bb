use bytes::Bytes;

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal_kind::SignalKind;

/// inline数据上限: 25个32位字
pub const MAX_SIGNAL_WORDS: usize = 25;
/// long section槽位上限
pub const MAX_SECTIONS: usize = 3;

/// A variable-length byte buffer attached to a signal slot.
///
/// 入队后不可变更；投递时所有权转移给handler。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongSection {
    data: Bytes,
}

impl LongSection {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self { data: Bytes::copy_from_slice(data) }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 线上以字为单位的长度（字节数向上取整到4）
    pub fn len_words(&self) -> u32 {
        ((self.data.len() + 3) / 4) as u32
    }
}

/////////////////////////////////////
/// Signal
///
/// 固定布局消息:
///
/// ```txt
/// |===========================|
/// | kind       u16            |
/// | sender     BlockRef (u32) |
/// | receiver   BlockRef (u32) |
/// | trace_id   u32            |
/// |---------------------------|
/// | data[0..length]  u32字    | <= 25字, 每类信号布局静态已知
/// |---------------------------|
/// | sections[0..3]            | 可选long section
/// |===========================|
/// ```
/////////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    kind: SignalKind,
    sender: BlockRef,
    receiver: BlockRef,
    trace_id: u32,
    length: u8,
    data: [u32; MAX_SIGNAL_WORDS],
    sections: Vec<LongSection>,
}

impl Signal {
    pub fn new(kind: SignalKind, sender: BlockRef, receiver: BlockRef, words: &[u32]) -> XResult<Self> {
        if words.len() > MAX_SIGNAL_WORDS {
            return Err(XtError::Bug(format!("signal length {} exceeds {} words.", words.len(), MAX_SIGNAL_WORDS)));
        }
        let mut data = [0u32; MAX_SIGNAL_WORDS];
        data[..words.len()].copy_from_slice(words);
        Ok(Self {
            kind,
            sender,
            receiver,
            trace_id: 0,
            length: words.len() as u8,
            data,
            sections: Vec::new(),
        })
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn sender(&self) -> BlockRef {
        self.sender
    }

    pub fn receiver(&self) -> BlockRef {
        self.receiver
    }

    pub fn trace_id(&self) -> u32 {
        self.trace_id
    }

    pub fn set_trace_id(&mut self, trace_id: u32) {
        self.trace_id = trace_id;
    }

    /// inline字长
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// inline数据（有效前缀）
    pub fn words(&self) -> &[u32] {
        &self.data[..self.length as usize]
    }

    pub fn word(&self, idx: usize) -> XResult<u32> {
        if idx >= self.length as usize {
            return Err(XtError::Bug(format!("signal word {} out of length {}.", idx, self.length)));
        }
        Ok(self.data[idx])
    }

    /// 追加long section。 发送后不可再变更。
    pub fn attach_section(&mut self, section: LongSection) -> XResult<()> {
        if self.sections.len() >= MAX_SECTIONS {
            return Err(XtError::Bug(format!("signal has {} sections already.", MAX_SECTIONS)));
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, slot: usize) -> Option<&LongSection> {
        self.sections.get(slot)
    }

    pub fn sections(&self) -> &[LongSection] {
        &self.sections
    }

    /// 投递时转移所有权给handler。 未retain的section在handler返回后释放。
    pub fn take_sections(&mut self) -> Vec<LongSection> {
        std::mem::take(&mut self.sections)
    }
}
