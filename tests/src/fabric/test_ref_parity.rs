use std::sync::{Arc, Mutex};

use common::err::XResult;
use common::log::tracing_factory::TracingFactory;
use fabric::block::Block;
use fabric::block_ref::{BlockRef, DBDICT, DBTC};
use fabric::dispatcher::Dispatcher;
use fabric::registry::BlockRegistry;
use fabric::signal::Signal;
use fabric::signal_kind::SignalKind;
use fabric::signaldata::alter_indx::{AlterIndxConf, AlterIndxErrorCode, AlterIndxRef, AlterIndxReq};

/// 字典block: 只有master才接受ALTER_INDX_REQ,
/// 非master回ALTER_INDX_REF(NotMaster)并带上master节点。
struct DictBlock {
    node_id: u32,
    master_node_id: u32,
}

impl Block for DictBlock {
    fn block_no(&self) -> u16 {
        DBDICT
    }

    fn handle(&mut self, signal: &mut Signal) -> XResult<Vec<Signal>> {
        match signal.kind() {
            SignalKind::AlterIndxReq => {
                let req = AlterIndxReq::from_signal(signal)?;
                if self.node_id != self.master_node_id {
                    let rf = AlterIndxRef {
                        sender_ref: signal.receiver().raw(),
                        client_data: req.client_data,
                        trans_id: req.trans_id,
                        index_id: req.index_id,
                        index_version: req.index_version,
                        error_code: AlterIndxErrorCode::NotMaster.into(),
                        error_line: 0,
                        error_node_id: self.node_id,
                        master_node_id: self.master_node_id,
                    };
                    return Ok(vec![rf.to_signal(signal.receiver(), signal.sender())?]);
                }
                let conf = AlterIndxConf {
                    sender_ref: signal.receiver().raw(),
                    client_data: req.client_data,
                    trans_id: req.trans_id,
                    index_id: req.index_id,
                    index_version: req.index_version,
                };
                Ok(vec![conf.to_signal(signal.receiver(), signal.sender())?])
            }
            _ => Ok(vec![]),
        }
    }
}

struct Client {
    got: Arc<Mutex<Vec<Signal>>>,
}

impl Block for Client {
    fn block_no(&self) -> u16 {
        DBTC
    }

    fn handle(&mut self, signal: &mut Signal) -> XResult<Vec<Signal>> {
        self.got.lock().unwrap().push(signal.clone());
        Ok(vec![])
    }
}

fn run_alter_indx(node_id: u32, master_node_id: u32) -> Vec<Signal> {
    let got = Arc::new(Mutex::new(Vec::new()));
    let mut reg = BlockRegistry::new();
    reg.register(0, Box::new(Client { got: Arc::clone(&got) }));
    reg.register(0, Box::new(DictBlock { node_id, master_node_id }));
    let mut d = Dispatcher::new(reg);

    let req = AlterIndxReq {
        client_ref: BlockRef::main(DBTC).raw(),
        client_data: 0xC0FFEE,
        trans_id: 0x7777,
        trans_key: 0,
        request_info: 0,
        index_id: 12,
        index_version: 3,
    };
    d.post(req.to_signal(BlockRef::main(DBTC), BlockRef::main(DBDICT)).unwrap());
    d.run_until_idle().unwrap();

    let got = got.lock().unwrap();
    got.clone()
}

#[test]
pub fn test_non_master_replies_ref_with_echo() {
    TracingFactory::init_log(true);

    // 节点2收到请求, master是节点1
    let replies = run_alter_indx(2, 1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].kind(), SignalKind::AlterIndxRef);

    let rf = AlterIndxRef::from_signal(&replies[0]).unwrap();
    // clientData与transId逐字回显
    assert_eq!(rf.client_data, 0xC0FFEE);
    assert_eq!(rf.trans_id, 0x7777);
    assert_eq!(rf.index_id, 12);
    assert_eq!(rf.index_version, 3);
    assert_eq!(rf.error_code, 702);
    assert_eq!(rf.error_node_id, 2);
    assert_eq!(rf.master_node_id, 1);
}

#[test]
pub fn test_master_replies_conf_with_echo() {
    TracingFactory::init_log(true);

    let replies = run_alter_indx(1, 1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].kind(), SignalKind::AlterIndxConf);

    let conf = AlterIndxConf::from_signal(&replies[0]).unwrap();
    assert_eq!(conf.client_data, 0xC0FFEE);
    assert_eq!(conf.trans_id, 0x7777);
    assert_eq!(conf.index_id, 12);
}
