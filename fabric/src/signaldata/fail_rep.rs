use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/// FAIL_REP: 节点失败通报。 QMGR广播。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailRep {
    pub fail_node_id: u32,
    pub fail_cause: u32,
    /// fail_cause == PartitionedCluster 时有效
    pub president: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FailCause {
    OwnFailure = 0,
    OtherNodeWhenWeStart = 1,
    InPrepFailReq = 2,
    StartInRegReq = 3,
    HeartbeatFailure = 4,
    LinkFailure = 5,
    OtherNodeFailedDuringStart = 6,
    MultiNodeShutdown = 7,
    PartitionedCluster = 8,
}

impl FailRep {
    pub const SIGNAL_LENGTH: usize = 3;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::FailRep, sender, receiver,
                    &[self.fail_node_id, self.fail_cause, self.president])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::FailRep || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed FAIL_REP.".to_string()));
        }
        let w = signal.words();
        Ok(Self { fail_node_id: w[0], fail_cause: w[1], president: w[2] })
    }
}

/// NODE_FAIL_REP: 失败集合通报。
/// 节点集合作为long section附带 (每节点一个u32)。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFailRep {
    pub fail_no: u32,
    pub master_node_id: u32,
    pub no_of_nodes: u32,
}

impl NodeFailRep {
    pub const SIGNAL_LENGTH: usize = 3;
    pub const NODES_SECTION_NUM: usize = 0;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::NodeFailRep, sender, receiver,
                    &[self.fail_no, self.master_node_id, self.no_of_nodes])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::NodeFailRep || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed NODE_FAIL_REP.".to_string()));
        }
        let w = signal.words();
        Ok(Self { fail_no: w[0], master_node_id: w[1], no_of_nodes: w[2] })
    }
}

/// NF_COMPLETE_REP - Node Fail Complete Report
///
/// block完成节点失败清理后上报。 blockNo为0表示整个节点完成。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfCompleteRep {
    pub block_no: u32,
    pub node_id: u32,
    pub failed_node_id: u32,
    pub from: u32,
}

impl NfCompleteRep {
    pub const SIGNAL_LENGTH: usize = 4;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::NfCompleteRep, sender, receiver,
                    &[self.block_no, self.node_id, self.failed_node_id, self.from])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::NfCompleteRep || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed NF_COMPLETE_REP.".to_string()));
        }
        let w = signal.words();
        Ok(Self { block_no: w[0], node_id: w[1], failed_node_id: w[2], from: w[3] })
    }
}
