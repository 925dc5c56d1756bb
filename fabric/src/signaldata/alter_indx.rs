use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/////////////////////////////////////
/// ALTER_INDX_REQ / CONF / REF
///
/// 索引alter请求三元组。 Conf/Ref必须逐字回显
/// clientData与transId (可测性质6)。
/////////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlterIndxReq {
    pub client_ref: u32,
    pub client_data: u32,
    pub trans_id: u32,
    pub trans_key: u32,
    pub request_info: u32,
    pub index_id: u32,
    pub index_version: u32,
}

/// requestInfo flag: 离线构建
pub const RF_BUILD_OFFLINE: u32 = 1 << 8;

impl AlterIndxReq {
    pub const SIGNAL_LENGTH: usize = 7;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::AlterIndxReq, sender, receiver,
                    &[self.client_ref, self.client_data, self.trans_id, self.trans_key,
                      self.request_info, self.index_id, self.index_version])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::AlterIndxReq {
            return Err(XtError::Bug(format!("expected ALTER_INDX_REQ, got {}.", signal.kind().name())));
        }
        if signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error(format!("ALTER_INDX_REQ length {}.", signal.length())));
        }
        let w = signal.words();
        Ok(Self {
            client_ref: w[0],
            client_data: w[1],
            trans_id: w[2],
            trans_key: w[3],
            request_info: w[4],
            index_id: w[5],
            index_version: w[6],
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlterIndxConf {
    pub sender_ref: u32,
    /// clientData回显
    pub client_data: u32,
    pub trans_id: u32,
    pub index_id: u32,
    pub index_version: u32,
}

impl AlterIndxConf {
    pub const SIGNAL_LENGTH: usize = 5;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::AlterIndxConf, sender, receiver,
                    &[self.sender_ref, self.client_data, self.trans_id, self.index_id, self.index_version])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::AlterIndxConf || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed ALTER_INDX_CONF.".to_string()));
        }
        let w = signal.words();
        Ok(Self {
            sender_ref: w[0],
            client_data: w[1],
            trans_id: w[2],
            index_id: w[3],
            index_version: w[4],
        })
    }
}

/// 错误码是跨版本稳定的整型值，从wire收到后不得重映射。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AlterIndxErrorCode {
    NoError = 0,
    InvalidIndexVersion = 241,
    Busy = 701,
    NotMaster = 702,
    IndexNotFound = 4243,
    IndexExists = 4244,
    BadRequestType = 4247,
    NotAnIndex = 4254,
    BadState = 4347,
    Inconsistency = 4348,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlterIndxRef {
    pub sender_ref: u32,
    /// clientData回显
    pub client_data: u32,
    pub trans_id: u32,
    pub index_id: u32,
    pub index_version: u32,
    pub error_code: u32,
    pub error_line: u32,
    pub error_node_id: u32,
    pub master_node_id: u32,
}

impl AlterIndxRef {
    pub const SIGNAL_LENGTH: usize = 9;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::AlterIndxRef, sender, receiver,
                    &[self.sender_ref, self.client_data, self.trans_id, self.index_id,
                      self.index_version, self.error_code, self.error_line,
                      self.error_node_id, self.master_node_id])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::AlterIndxRef || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed ALTER_INDX_REF.".to_string()));
        }
        let w = signal.words();
        Ok(Self {
            sender_ref: w[0],
            client_data: w[1],
            trans_id: w[2],
            index_id: w[3],
            index_version: w[4],
            error_code: w[5],
            error_line: w[6],
            error_node_id: w[7],
            master_node_id: w[8],
        })
    }
}
