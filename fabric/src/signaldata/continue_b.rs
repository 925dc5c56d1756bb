use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/////////////////////////////////////
/// CONTINUEB
///
/// block自投递的后台继续信号。 word 0是block私有的tag枚举,
/// 其余字是tag各自的参数。 收到未知tag对该block是致命的
/// (block下线, 进程继续)。
/////////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueB {
    pub tag: u32,
    pub words: Vec<u32>,
}

impl ContinueB {
    pub fn new(tag: u32, words: &[u32]) -> Self {
        Self { tag, words: words.to_vec() }
    }

    pub fn to_signal(&self, block_ref: BlockRef) -> XResult<Signal> {
        let mut all = Vec::with_capacity(1 + self.words.len());
        all.push(self.tag);
        all.extend_from_slice(&self.words);
        // 自己发给自己
        Signal::new(SignalKind::ContinueB, block_ref, block_ref, &all)
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::ContinueB {
            return Err(XtError::Bug(format!("expected CONTINUEB, got {}.", signal.kind().name())));
        }
        if signal.length() < 1 {
            return Err(XtError::Error("CONTINUEB without tag.".to_string()));
        }
        let w = signal.words();
        Ok(Self { tag: w[0], words: w[1..].to_vec() })
    }
}

/// DBDIH的CONTINUEB tag枚举。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum DihContinueB {
    ZPACK_TABLE_INTO_PAGES = 1,
    ZPACK_FRAG_INTO_PAGES = 2,
    ZREAD_PAGES_INTO_TABLE = 3,
    ZREAD_PAGES_INTO_FRAG = 4,
    ZCOPY_TABLE = 6,
    ZCOPY_TABLE_NODE = 7,
    ZSTART_FRAGMENT = 8,
    ZCOMPLETE_RESTART = 9,
    ZREAD_TABLE_FROM_PAGES = 10,
    ZSR_PHASE2_READ_TABLE = 11,
    ZCHECK_TC_COUNTER = 12,
    ZCALCULATE_KEEP_GCI = 13,
    ZSTORE_NEW_LCP_ID = 14,
    ZTABLE_UPDATE = 15,
    ZCHECK_LCP_COMPLETED = 16,
    ZINIT_LCP = 17,
    ZADD_TABLE_MASTER_PAGES = 19,
    ZDIH_ADD_TABLE_MASTER = 20,
    ZADD_TABLE_SLAVE_PAGES = 21,
    ZDIH_ADD_TABLE_SLAVE = 22,
    ZSTART_GCP = 23,
    ZCOPY_GCI = 24,
    ZEMPTY_VERIFY_QUEUE = 25,
    ZCHECK_GCP_STOP = 26,
    ZREMOVE_NODE_FROM_TABLE = 27,
    ZCOPY_NODE = 28,
    ZSTART_TAKE_OVER = 29,
    ZCHECK_START_TAKE_OVER = 30,
    ZINITIALISE_RECORDS = 33,
    ZINVALIDATE_NODE_LCP = 34,
    ZSTART_PERMREQ_AGAIN = 35,
}

/// LGMAN的CONTINUEB tag枚举。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum LgmanContinueB {
    CUT_LOG_TAIL = 1,
    FILTER_LOG = 2,
    FLUSH_LOG = 3,
    PROCESS_LOG_BUFFER_WAITERS = 4,
    FIND_LOG_HEAD = 5,
    EXECUTE_UNDO_RECORD = 6,
    STOP_UNDO_LOG = 7,
    READ_UNDO_LOG = 8,
    PROCESS_LOG_SYNC_WAITERS = 9,
    FORCE_LOG_SYNC = 10,
    DROP_FILEGROUP = 11,
}

/// PGMAN的CONTINUEB tag枚举。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PgmanContinueB {
    STATS_LOOP = 0,
    BUSY_LOOP = 1,
    CLEANUP_LOOP = 2,
    LCP_LOOP = 3,
    LCP_LOCKED = 4,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_ref::{BlockRef, DBDIH};

    #[test]
    fn test_round_trip() {
        let c = ContinueB::new(DihContinueB::ZSTART_GCP.into(), &[5, 6]);
        let sig = c.to_signal(BlockRef::main(DBDIH)).unwrap();
        assert_eq!(sig.sender(), sig.receiver());
        let back = ContinueB::from_signal(&sig).unwrap();
        assert_eq!(back.tag, 23);
        assert_eq!(back.words, vec![5, 6]);
        assert_eq!(DihContinueB::try_from(back.tag).unwrap(), DihContinueB::ZSTART_GCP);
    }

    #[test]
    fn test_unknown_tag() {
        // tag 99 不在DIH的枚举里 -> block侧按致命处理
        assert!(DihContinueB::try_from(99u32).is_err());
    }
}
