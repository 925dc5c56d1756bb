use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/////////////////////////////////////
/// BUILD_INDX_REQ / CONF / REF
///
/// 索引构建三元组, canonical布局。 旧版9字布局
/// (userRef/connectionPtr打头, 无transId) 通过
/// from_legacy_words 转换后进入同一条路径。
/////////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIndxReq {
    pub sender_ref: u32,
    pub sender_data: u32,
    pub request_type: u32,
    pub trans_id: u32,
    /// Suma subscription id
    pub build_id: u32,
    /// Suma subscription key
    pub build_key: u32,
    pub table_id: u32,
    pub index_id: u32,
    pub index_type: u32,
    pub parallelism: u32,
}

/// requestType flags
pub const RF_BUILD_OFFLINE: u32 = 1 << 8;
/// Indexed columns are not on disk
pub const RF_NO_DISK: u32 = 1 << 9;

impl BuildIndxReq {
    pub const SIGNAL_LENGTH: usize = 10;
    pub const LEGACY_SIGNAL_LENGTH: usize = 9;
    pub const INDEX_COLUMNS: usize = 0;
    pub const KEY_COLUMNS: usize = 1;
    pub const NO_OF_SECTIONS: usize = 2;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::BuildIndxReq, sender, receiver,
                    &[self.sender_ref, self.sender_data, self.request_type, self.trans_id,
                      self.build_id, self.build_key, self.table_id, self.index_id,
                      self.index_type, self.parallelism])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::BuildIndxReq {
            return Err(XtError::Bug(format!("expected BUILD_INDX_REQ, got {}.", signal.kind().name())));
        }
        match signal.length() {
            Self::LEGACY_SIGNAL_LENGTH => Self::from_legacy_words(signal.words()),
            n if n >= Self::SIGNAL_LENGTH => {
                let w = signal.words();
                Ok(Self {
                    sender_ref: w[0],
                    sender_data: w[1],
                    request_type: w[2],
                    trans_id: w[3],
                    build_id: w[4],
                    build_key: w[5],
                    table_id: w[6],
                    index_id: w[7],
                    index_type: w[8],
                    parallelism: w[9],
                })
            }
            n => Err(XtError::Error(format!("BUILD_INDX_REQ length {}.", n))),
        }
    }

    /// 旧版布局:
    /// userRef, connectionPtr, requestInfo, buildId, buildKey,
    /// tableId, indexType, indexId, parallelism
    ///
    /// connectionPtr充当senderData; transId在旧版不存在, 置0。
    pub fn from_legacy_words(w: &[u32]) -> XResult<Self> {
        if w.len() < Self::LEGACY_SIGNAL_LENGTH {
            return Err(XtError::Error(format!("legacy BUILD_INDX_REQ length {}.", w.len())));
        }
        Ok(Self {
            sender_ref: w[0],
            sender_data: w[1],
            request_type: w[2],
            trans_id: 0,
            build_id: w[3],
            build_key: w[4],
            table_id: w[5],
            index_type: w[6],
            index_id: w[7],
            parallelism: w[8],
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIndxConf {
    pub sender_ref: u32,
    pub sender_data: u32,
}

impl BuildIndxConf {
    pub const SIGNAL_LENGTH: usize = 2;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::BuildIndxConf, sender, receiver,
                    &[self.sender_ref, self.sender_data])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::BuildIndxConf || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed BUILD_INDX_CONF.".to_string()));
        }
        let w = signal.words();
        Ok(Self { sender_ref: w[0], sender_data: w[1] })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BuildIndxErrorCode {
    NoError = 0,
    Busy = 701,
    NotMaster = 702,
    BadRequestType = 4247,
    InvalidPrimaryTable = 4249,
    InvalidIndexType = 4250,
    IndexNotUnique = 4251,
    AllocationFailure = 4252,
    InternalError = 4346,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIndxRef {
    pub sender_ref: u32,
    pub sender_data: u32,
    pub error_code: u32,
    pub error_line: u32,
    pub error_node_id: u32,
    pub master_node_id: u32,
}

impl BuildIndxRef {
    pub const SIGNAL_LENGTH: usize = 6;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::BuildIndxRef, sender, receiver,
                    &[self.sender_ref, self.sender_data, self.error_code,
                      self.error_line, self.error_node_id, self.master_node_id])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::BuildIndxRef || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed BUILD_INDX_REF.".to_string()));
        }
        let w = signal.words();
        Ok(Self {
            sender_ref: w[0],
            sender_data: w[1],
            error_code: w[2],
            error_line: w[3],
            error_node_id: w[4],
            master_node_id: w[5],
        })
    }
}
