use common::err::XResult;

use crate::signal::Signal;
use crate::signal_kind::SignalKind;
use crate::signaldata::alter_indx::{AlterIndxRef, AlterIndxReq};
use crate::signaldata::build_indx::{BuildIndxRef, BuildIndxReq};
use crate::signaldata::lqh_key::{LqhKeyRef, LqhKeyReq};

/// 为请求合成家族REF应答。
///
/// 用于三种无法投递的情况: worker实例缺失、block离线、节点失败。
/// senderData/transId逐字回显 (可测性质6)；应答寄回请求的sender。
///
/// 非Req家族信号返回None, 由调用方丢弃。
pub fn synth_ref(req: &Signal, error_code: u32, master_node_id: u32) -> XResult<Option<Signal>> {
    let reply = match req.kind() {
        SignalKind::LqhKeyReq => {
            let r = LqhKeyReq::from_signal(req)?;
            let rf = LqhKeyRef {
                connect_ptr: r.client_connect_ptr,
                user_ref: r.tc_blockref,
                trans_id1: r.trans_id1,
                trans_id2: r.trans_id2,
                error_code,
            };
            Some(rf.to_signal(req.receiver(), req.sender())?)
        }
        SignalKind::AlterIndxReq => {
            let r = AlterIndxReq::from_signal(req)?;
            let rf = AlterIndxRef {
                sender_ref: req.receiver().raw(),
                client_data: r.client_data,
                trans_id: r.trans_id,
                index_id: r.index_id,
                index_version: r.index_version,
                error_code,
                error_line: 0,
                error_node_id: 0,
                master_node_id,
            };
            Some(rf.to_signal(req.receiver(), req.sender())?)
        }
        SignalKind::BuildIndxReq => {
            let r = BuildIndxReq::from_signal(req)?;
            let rf = BuildIndxRef {
                sender_ref: req.receiver().raw(),
                sender_data: r.sender_data,
                error_code,
                error_line: 0,
                error_node_id: 0,
                master_node_id,
            };
            Some(rf.to_signal(req.receiver(), req.sender())?)
        }
        _ => None,
    };
    Ok(reply)
}
