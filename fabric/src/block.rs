use common::err::XResult;

use crate::signal::Signal;

/// Block状态。
/// handler出错后block下线, 后续寄往它的请求由派发器合成REF。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Online,
    Offline,
}

/// A cooperatively-scheduled actor identified by block number and
/// instance.
///
/// handler约定:
/// - 运行到完成, 不得阻塞I/O或等待其它信号;
/// - 长任务拆分为自投递的CONTINUEB;
/// - 应答/继续信号通过返回值交回派发器入队, 不直接发送;
/// - 返回Err则仅该block进入错误状态, 进程继续。
pub trait Block {
    fn block_no(&self) -> u16;

    fn handle(&mut self, signal: &mut Signal) -> XResult<Vec<Signal>>;
}
