use std::collections::VecDeque;

use tracing::{debug, warn};

use common::err::XResult;

use crate::block::BlockState;
use crate::block_ref::BlockRef;
use crate::registry::{BlockRegistry, Route};
use crate::signal::Signal;
use crate::signaldata::continue_b::ContinueB;
use crate::signaldata::synth::synth_ref;
use crate::signaldata::NF_FAKE_ERROR_REF;

/// 本地节点的队列条目记号
pub const LOCAL_NODE: u16 = 0;

#[derive(Debug)]
struct Queued {
    signal: Signal,
    /// 信号来源节点, LOCAL_NODE为本进程
    from_node: u16,
    /// 目的节点, LOCAL_NODE为本进程
    to_node: u16,
}

/////////////////////////////////////
/// Dispatcher
///
/// 每个thread group一个, 单线程协作式循环:
/// 排空ready队列, 逐个调用接收block的handler。
///
/// 保证:
/// - 同一(sender, receiver)对上FIFO; 跨sender无全序;
/// - handler运行到完成, 产生的应答在其返回后入队;
/// - handler失败只隔离该block。
/////////////////////////////////////
pub struct Dispatcher {
    registry: BlockRegistry,
    queue: VecDeque<Queued>,
    /// 当前master节点, 合成REF时回填masterNodeId
    master_node_id: u32,
    delivered: u64,
}

impl Dispatcher {
    pub fn new(registry: BlockRegistry) -> Self {
        Self {
            registry,
            queue: VecDeque::new(),
            master_node_id: 0,
            delivered: 0,
        }
    }

    pub fn registry_mut(&mut self) -> &mut BlockRegistry {
        &mut self.registry
    }

    pub fn set_master_node_id(&mut self, node: u32) {
        self.master_node_id = node;
    }

    /// 本地入队。 section所有权随signal转移到队列。
    pub fn post(&mut self, signal: Signal) {
        self.queue.push_back(Queued { signal, from_node: LOCAL_NODE, to_node: LOCAL_NODE });
    }

    /// 从远端连接收到的signal入队
    pub fn post_from_node(&mut self, signal: Signal, from_node: u16) {
        self.queue.push_back(Queued { signal, from_node, to_node: LOCAL_NODE });
    }

    /// 寄往远端节点的signal入队, 等待transport pump取走
    pub fn post_to_node(&mut self, signal: Signal, to_node: u16) {
        self.queue.push_back(Queued { signal, from_node: LOCAL_NODE, to_node });
    }

    /// 自投递后台继续信号的快速路径
    pub fn post_continue(&mut self, block_ref: BlockRef, tag: u32, words: &[u32]) -> XResult<()> {
        let signal = ContinueB::new(tag, words).to_signal(block_ref)?;
        self.post(signal);
        Ok(())
    }

    /// 取走所有寄往远端的条目 (交给transport)
    pub fn drain_outbound(&mut self) -> Vec<(u16, Signal)> {
        let mut out = Vec::new();
        let mut rest = VecDeque::with_capacity(self.queue.len());
        for q in self.queue.drain(..) {
            if q.to_node != LOCAL_NODE {
                out.push((q.to_node, q.signal));
            } else {
                rest.push_back(q);
            }
        }
        self.queue = rest;
        out
    }

    /// 节点失败:
    /// - 寄往失败节点的pending请求改写为REF应答;
    /// - 来自失败节点的in-flight请求丢弃。
    pub fn note_node_failure(&mut self, failed_node: u16) -> XResult<()> {
        let mut rest = VecDeque::with_capacity(self.queue.len());
        let mut refs: Vec<Signal> = Vec::new();
        for q in self.queue.drain(..) {
            if q.from_node == failed_node {
                debug!("drop in-flight signal {} from failed node {}.", q.signal.kind().name(), failed_node);
                continue;
            }
            if q.to_node == failed_node {
                if let Some(reply) = synth_ref(&q.signal, NF_FAKE_ERROR_REF, self.master_node_id)? {
                    refs.push(reply);
                } else {
                    debug!("drop non-request signal {} to failed node {}.", q.signal.kind().name(), failed_node);
                }
                continue;
            }
            rest.push_back(q);
        }
        self.queue = rest;
        for r in refs {
            self.post(r);
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// 排空ready队列。 返回本轮投递的signal数。
    ///
    /// handler非抢占; 长任务自行经post_continue让出。
    pub fn run_until_idle(&mut self) -> XResult<usize> {
        let mut n = 0usize;
        loop {
            let mut q = match self.queue.pop_front() {
                Some(q) => q,
                None => break,
            };
            if q.to_node != LOCAL_NODE {
                // 远端条目留给transport pump
                self.queue.push_back(q);
                if self.queue.iter().all(|e| e.to_node != LOCAL_NODE) {
                    break;
                }
                continue;
            }

            let receiver = q.signal.receiver();
            let outcome = match self.registry.route(receiver) {
                Route::NoBlock | Route::NoInstance => {
                    warn!("no route to {}: {}.", receiver, q.signal.kind().name());
                    Deliver::Unroutable
                }
                Route::Slot(slot) => {
                    if slot.state == BlockState::Offline {
                        Deliver::BlockOffline
                    } else {
                        match slot.block.handle(&mut q.signal) {
                            Ok(replies) => Deliver::Done(replies),
                            Err(e) => Deliver::Failed(e.to_string()),
                        }
                    }
                }
            };

            match outcome {
                Deliver::Done(replies) => {
                    n += 1;
                    self.delivered += 1;
                    for r in replies {
                        self.post(r);
                    }
                }
                Deliver::Failed(e) => {
                    // 隔离到block: 下线, 请求方得到合成REF
                    warn!("block {} handler failed: {}. taking block offline.", receiver, e);
                    self.registry.set_state(receiver, BlockState::Offline);
                    if let Some(reply) = synth_ref(&q.signal, NF_FAKE_ERROR_REF, self.master_node_id)? {
                        self.post(reply);
                    }
                }
                Deliver::BlockOffline | Deliver::Unroutable => {
                    if let Some(reply) = synth_ref(&q.signal, NF_FAKE_ERROR_REF, self.master_node_id)? {
                        self.post(reply);
                    }
                }
            }
        }
        Ok(n)
    }
}

enum Deliver {
    Done(Vec<Signal>),
    Failed(String),
    BlockOffline,
    Unroutable,
}
