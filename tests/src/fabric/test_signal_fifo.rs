use std::sync::{Arc, Mutex};

use common::err::XResult;
use common::log::tracing_factory::TracingFactory;
use fabric::block::Block;
use fabric::block_ref::{BlockRef, DBDICT, DBLQH, DBTC};
use fabric::dispatcher::Dispatcher;
use fabric::registry::BlockRegistry;
use fabric::signal::Signal;
use fabric::signal_kind::SignalKind;
use fabric::signaldata::continue_b::{ContinueB, DihContinueB};

/// 记录 (sender, word0) 序列
struct Recorder {
    no: u16,
    log: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl Block for Recorder {
    fn block_no(&self) -> u16 {
        self.no
    }

    fn handle(&mut self, signal: &mut Signal) -> XResult<Vec<Signal>> {
        self.log.lock().unwrap().push((signal.sender().raw(), signal.word(0)?));
        Ok(vec![])
    }
}

#[test]
pub fn test_fifo_per_sender_pair() {
    TracingFactory::init_log(true);

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut reg = BlockRegistry::new();
    reg.register(0, Box::new(Recorder { no: DBDICT, log: Arc::clone(&log) }));
    let mut d = Dispatcher::new(reg);

    let a = BlockRef::main(DBTC);
    let b = BlockRef::main(DBLQH);
    let dst = BlockRef::main(DBDICT);

    // 两个sender交错投递
    for i in 0..10u32 {
        d.post(Signal::new(SignalKind::NfCompleteRep, a, dst, &[i, 0, 0, 0]).unwrap());
        d.post(Signal::new(SignalKind::NfCompleteRep, b, dst, &[100 + i, 0, 0, 0]).unwrap());
    }
    d.run_until_idle().unwrap();

    // 每对(sender, receiver)上保序
    let log = log.lock().unwrap();
    let from_a: Vec<u32> = log.iter().filter(|(s, _)| *s == a.raw()).map(|(_, w)| *w).collect();
    let from_b: Vec<u32> = log.iter().filter(|(s, _)| *s == b.raw()).map(|(_, w)| *w).collect();
    assert_eq!(from_a, (0..10).collect::<Vec<u32>>());
    assert_eq!(from_b, (100..110).collect::<Vec<u32>>());
}

/// 用CONTINUEB把长任务拆成有限步: 每步处理一截, 再自投递。
struct Walker {
    no: u16,
    steps: Arc<Mutex<Vec<u32>>>,
}

impl Block for Walker {
    fn block_no(&self) -> u16 {
        self.no
    }

    fn handle(&mut self, signal: &mut Signal) -> XResult<Vec<Signal>> {
        let c = ContinueB::from_signal(signal)?;
        let remaining = c.words[0];
        self.steps.lock().unwrap().push(remaining);
        if remaining > 0 {
            let next = ContinueB::new(c.tag, &[remaining - 1]);
            return Ok(vec![next.to_signal(signal.receiver())?]);
        }
        Ok(vec![])
    }
}

#[test]
pub fn test_continue_b_bounded_steps() {
    TracingFactory::init_log(true);

    let steps = Arc::new(Mutex::new(Vec::new()));
    let mut reg = BlockRegistry::new();
    reg.register(0, Box::new(Walker { no: DBDICT, steps: Arc::clone(&steps) }));
    let mut d = Dispatcher::new(reg);

    d.post_continue(BlockRef::main(DBDICT), DihContinueB::ZPACK_TABLE_INTO_PAGES.into(), &[4]).unwrap();
    let delivered = d.run_until_idle().unwrap();

    assert_eq!(delivered, 5);
    assert_eq!(*steps.lock().unwrap(), vec![4, 3, 2, 1, 0]);
}
