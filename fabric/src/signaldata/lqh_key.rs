use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/////////////////////////////////////
/// LQHKEYREQ
///
/// Key操作请求: 事务协调器 -> 本地query handler。
///
/// 固定部分11字:
///
/// ```txt
/// | client_connect_ptr    DATA 0  |
/// | attr_len              DATA 1  |
/// | hash_value            DATA 2  |
/// | request_info          DATA 3  | <- 按位打包, 见 RI_*
/// | tc_blockref           DATA 4  |
/// | table_schema_version  DATA 5  |
/// | fragment_data         DATA 6  |
/// | trans_id1             DATA 7  |
/// | trans_id2             DATA 8  |
/// | save_point_id         DATA 9  |
/// | scan_info             DATA 10 |
/// ```
///
/// Long变体把key与attr信息放在section里。
/////////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LqhKeyReq {
    pub client_connect_ptr: u32,
    pub attr_len: u32,
    pub hash_value: u32,
    pub request_info: u32,
    pub tc_blockref: u32,
    pub table_schema_version: u32,
    pub fragment_data: u32,
    pub trans_id1: u32,
    pub trans_id2: u32,
    pub save_point_id: u32,
    pub scan_info: u32,
}

// request_info按位布局。 位宽与偏移是契约，收发双方必须一致。
const RI_KEYLEN_SHIFT: u32 = 0;
const RI_KEYLEN_MASK: u32 = 1023;
const RI_LAST_REPL_SHIFT: u32 = 10;
const RI_LAST_REPL_MASK: u32 = 3;
const RI_LOCK_TYPE_SHIFT: u32 = 12;
const RI_LOCK_TYPE_MASK: u32 = 7;
const RI_GCI_SHIFT: u32 = 12;
const RI_NR_COPY_SHIFT: u32 = 13;
const RI_QUEUE_REDO_SHIFT: u32 = 14;
const RI_APPL_ADDR_SHIFT: u32 = 15;
const RI_DIRTY_SHIFT: u32 = 16;
const RI_INTERPRETED_SHIFT: u32 = 17;
const RI_SIMPLE_SHIFT: u32 = 18;
const RI_OPERATION_SHIFT: u32 = 19;
const RI_OPERATION_MASK: u32 = 7;
const RI_SEQ_REPLICA_SHIFT: u32 = 22;
const RI_SEQ_REPLICA_MASK: u32 = 3;
const RI_CORR_FACTOR_VALUE: u32 = 24;
const RI_NORMAL_DIRTY: u32 = 25;
const RI_DEFERRED_CONSTRAINTS: u32 = 26;
const RI_SAME_CLIENT_SHIFT: u32 = 27;
const RI_RETURN_AI_SHIFT: u32 = 28;
const RI_MARKER_SHIFT: u32 = 29;
const RI_NODISK_SHIFT: u32 = 30;
const RI_ROWID_SHIFT: u32 = 31;

// long request info独立一字
const LRI_DISABLE_FK: u32 = 0;
const LRI_NO_TRIGGERS: u32 = 1;
const LRI_UTIL_SHIFT: u32 = 2;
const LRI_NOWAIT_SHIFT: u32 = 3;

// scan_info布局
const SI_ATTR_LEN_MASK: u32 = 0xFFFF;
const SI_SCAN_TO_SHIFT: u32 = 16;
const SI_STORED_PROC_SHIFT: u32 = 17;
const SI_DIST_KEY_SHIFT: u32 = 18;
const SI_DIST_KEY_MASK: u32 = 0xFF;
const SI_REORG_SHIFT: u32 = 26;
const SI_REORG_MASK: u32 = 3;

#[inline]
fn get_bits(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

#[inline]
fn set_bits(word: &mut u32, shift: u32, mask: u32, val: u32) {
    debug_assert!(val <= mask);
    *word = (*word & !(mask << shift)) | ((val & mask) << shift);
}

impl LqhKeyReq {
    pub const FIXED_SIGNAL_LENGTH: usize = 11;
    pub const MAX_KEY_INFO: usize = 4;
    pub const MAX_ATTR_INFO: usize = 5;

    /* long LQHKEYREQ section编号 */
    pub const KEY_INFO_SECTION_NUM: usize = 0;
    pub const ATTR_INFO_SECTION_NUM: usize = 1;

    pub fn get_key_len(request_info: u32) -> u32 {
        get_bits(request_info, RI_KEYLEN_SHIFT, RI_KEYLEN_MASK)
    }

    pub fn set_key_len(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_KEYLEN_SHIFT, RI_KEYLEN_MASK, val);
    }

    pub fn get_last_replica_no(request_info: u32) -> u32 {
        get_bits(request_info, RI_LAST_REPL_SHIFT, RI_LAST_REPL_MASK)
    }

    pub fn set_last_replica_no(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_LAST_REPL_SHIFT, RI_LAST_REPL_MASK, val);
    }

    pub fn get_lock_type(request_info: u32) -> u32 {
        get_bits(request_info, RI_LOCK_TYPE_SHIFT, RI_LOCK_TYPE_MASK)
    }

    pub fn set_lock_type(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_LOCK_TYPE_SHIFT, RI_LOCK_TYPE_MASK, val);
    }

    /// dirty write变体下，lock type槽位复用为GCI标志
    pub fn get_gci_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_GCI_SHIFT, 1)
    }

    pub fn set_gci_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_GCI_SHIFT, 1, val);
    }

    pub fn get_nr_copy_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_NR_COPY_SHIFT, 1)
    }

    pub fn set_nr_copy_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_NR_COPY_SHIFT, 1, val);
    }

    pub fn get_queue_on_redo_problem_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_QUEUE_REDO_SHIFT, 1)
    }

    pub fn set_queue_on_redo_problem_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_QUEUE_REDO_SHIFT, 1, val);
    }

    pub fn get_application_address_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_APPL_ADDR_SHIFT, 1)
    }

    pub fn set_application_address_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_APPL_ADDR_SHIFT, 1, val);
    }

    pub fn get_dirty_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_DIRTY_SHIFT, 1)
    }

    pub fn set_dirty_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_DIRTY_SHIFT, 1, val);
    }

    pub fn get_interpreted_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_INTERPRETED_SHIFT, 1)
    }

    pub fn set_interpreted_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_INTERPRETED_SHIFT, 1, val);
    }

    pub fn get_simple_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_SIMPLE_SHIFT, 1)
    }

    pub fn set_simple_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_SIMPLE_SHIFT, 1, val);
    }

    pub fn get_operation(request_info: u32) -> u32 {
        get_bits(request_info, RI_OPERATION_SHIFT, RI_OPERATION_MASK)
    }

    pub fn set_operation(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_OPERATION_SHIFT, RI_OPERATION_MASK, val);
    }

    pub fn get_seq_no_replica(request_info: u32) -> u32 {
        get_bits(request_info, RI_SEQ_REPLICA_SHIFT, RI_SEQ_REPLICA_MASK)
    }

    pub fn set_seq_no_replica(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_SEQ_REPLICA_SHIFT, RI_SEQ_REPLICA_MASK, val);
    }

    pub fn get_corr_factor_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_CORR_FACTOR_VALUE, 1)
    }

    pub fn set_corr_factor_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_CORR_FACTOR_VALUE, 1, val);
    }

    /// dirty read仍然走完整LQHKEYCONF/REF协议
    pub fn get_normal_protocol_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_NORMAL_DIRTY, 1)
    }

    pub fn set_normal_protocol_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_NORMAL_DIRTY, 1, val);
    }

    pub fn get_deferred_constraints(request_info: u32) -> u32 {
        get_bits(request_info, RI_DEFERRED_CONSTRAINTS, 1)
    }

    pub fn set_deferred_constraints(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_DEFERRED_CONSTRAINTS, 1, val);
    }

    pub fn get_same_client_and_tc_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_SAME_CLIENT_SHIFT, 1)
    }

    pub fn set_same_client_and_tc_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_SAME_CLIENT_SHIFT, 1, val);
    }

    pub fn get_returned_read_len_ai_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_RETURN_AI_SHIFT, 1)
    }

    pub fn set_returned_read_len_ai_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_RETURN_AI_SHIFT, 1, val);
    }

    pub fn get_marker_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_MARKER_SHIFT, 1)
    }

    pub fn set_marker_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_MARKER_SHIFT, 1, val);
    }

    pub fn get_no_disk_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_NODISK_SHIFT, 1)
    }

    pub fn set_no_disk_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_NODISK_SHIFT, 1, val);
    }

    pub fn get_rowid_flag(request_info: u32) -> u32 {
        get_bits(request_info, RI_ROWID_SHIFT, 1)
    }

    pub fn set_rowid_flag(request_info: &mut u32, val: u32) {
        set_bits(request_info, RI_ROWID_SHIFT, 1, val);
    }

    pub fn get_disable_fk_constraints(long_request_info: u32) -> u32 {
        get_bits(long_request_info, LRI_DISABLE_FK, 1)
    }

    pub fn set_disable_fk_constraints(long_request_info: &mut u32, val: u32) {
        set_bits(long_request_info, LRI_DISABLE_FK, 1, val);
    }

    pub fn get_no_triggers_flag(long_request_info: u32) -> u32 {
        get_bits(long_request_info, LRI_NO_TRIGGERS, 1)
    }

    pub fn set_no_triggers_flag(long_request_info: &mut u32, val: u32) {
        set_bits(long_request_info, LRI_NO_TRIGGERS, 1, val);
    }

    pub fn get_util_flag(long_request_info: u32) -> u32 {
        get_bits(long_request_info, LRI_UTIL_SHIFT, 1)
    }

    pub fn set_util_flag(long_request_info: &mut u32, val: u32) {
        set_bits(long_request_info, LRI_UTIL_SHIFT, 1, val);
    }

    pub fn get_no_wait_flag(long_request_info: u32) -> u32 {
        get_bits(long_request_info, LRI_NOWAIT_SHIFT, 1)
    }

    pub fn set_no_wait_flag(long_request_info: &mut u32, val: u32) {
        set_bits(long_request_info, LRI_NOWAIT_SHIFT, 1, val);
    }

    pub fn get_attr_len(scan_info: u32) -> u32 {
        scan_info & SI_ATTR_LEN_MASK
    }

    pub fn set_attr_len(scan_info: &mut u32, val: u32) {
        set_bits(scan_info, 0, SI_ATTR_LEN_MASK, val);
    }

    pub fn get_scan_take_over_flag(scan_info: u32) -> u32 {
        get_bits(scan_info, SI_SCAN_TO_SHIFT, 1)
    }

    pub fn set_scan_take_over_flag(scan_info: &mut u32, val: u32) {
        set_bits(scan_info, SI_SCAN_TO_SHIFT, 1, val);
    }

    pub fn get_stored_proc_flag(scan_info: u32) -> u32 {
        get_bits(scan_info, SI_STORED_PROC_SHIFT, 1)
    }

    pub fn set_stored_proc_flag(scan_info: &mut u32, val: u32) {
        set_bits(scan_info, SI_STORED_PROC_SHIFT, 1, val);
    }

    pub fn get_distribution_key(scan_info: u32) -> u32 {
        get_bits(scan_info, SI_DIST_KEY_SHIFT, SI_DIST_KEY_MASK)
    }

    pub fn set_distribution_key(scan_info: &mut u32, val: u32) {
        set_bits(scan_info, SI_DIST_KEY_SHIFT, SI_DIST_KEY_MASK, val);
    }

    pub fn get_reorg_flag(scan_info: u32) -> u32 {
        get_bits(scan_info, SI_REORG_SHIFT, SI_REORG_MASK)
    }

    pub fn set_reorg_flag(scan_info: &mut u32, val: u32) {
        set_bits(scan_info, SI_REORG_SHIFT, SI_REORG_MASK, val);
    }

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        let words = [
            self.client_connect_ptr,
            self.attr_len,
            self.hash_value,
            self.request_info,
            self.tc_blockref,
            self.table_schema_version,
            self.fragment_data,
            self.trans_id1,
            self.trans_id2,
            self.save_point_id,
            self.scan_info,
        ];
        Signal::new(SignalKind::LqhKeyReq, sender, receiver, &words)
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::LqhKeyReq {
            return Err(XtError::Bug(format!("expected LQHKEYREQ, got {}.", signal.kind().name())));
        }
        if signal.length() < Self::FIXED_SIGNAL_LENGTH {
            return Err(XtError::Error(format!("LQHKEYREQ length {} below fixed part.", signal.length())));
        }
        let w = signal.words();
        Ok(Self {
            client_connect_ptr: w[0],
            attr_len: w[1],
            hash_value: w[2],
            request_info: w[3],
            tc_blockref: w[4],
            table_schema_version: w[5],
            fragment_data: w[6],
            trans_id1: w[7],
            trans_id2: w[8],
            save_point_id: w[9],
            scan_info: w[10],
        })
    }
}

/// LQHKEYCONF: 5字, senderData/transId回显
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LqhKeyConf {
    pub connect_ptr: u32,
    pub op_ptr: u32,
    pub trans_id1: u32,
    pub trans_id2: u32,
    pub read_len: u32,
}

impl LqhKeyConf {
    pub const SIGNAL_LENGTH: usize = 5;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::LqhKeyConf, sender, receiver,
                    &[self.connect_ptr, self.op_ptr, self.trans_id1, self.trans_id2, self.read_len])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::LqhKeyConf || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed LQHKEYCONF.".to_string()));
        }
        let w = signal.words();
        Ok(Self {
            connect_ptr: w[0],
            op_ptr: w[1],
            trans_id1: w[2],
            trans_id2: w[3],
            read_len: w[4],
        })
    }
}

/// LQHKEYREF: 5字
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LqhKeyRef {
    pub connect_ptr: u32,
    pub user_ref: u32,
    pub trans_id1: u32,
    pub trans_id2: u32,
    pub error_code: u32,
}

impl LqhKeyRef {
    pub const SIGNAL_LENGTH: usize = 5;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::LqhKeyRef, sender, receiver,
                    &[self.connect_ptr, self.user_ref, self.trans_id1, self.trans_id2, self.error_code])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::LqhKeyRef || signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error("malformed LQHKEYREF.".to_string()));
        }
        let w = signal.words();
        Ok(Self {
            connect_ptr: w[0],
            user_ref: w[1],
            trans_id1: w[2],
            trans_id2: w[3],
            error_code: w[4],
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_ref::{BlockRef, DBLQH, DBTC};

    #[test]
    fn test_request_info_bits() {
        let mut ri = 0u32;
        LqhKeyReq::set_key_len(&mut ri, 300);
        LqhKeyReq::set_lock_type(&mut ri, 5);
        LqhKeyReq::set_operation(&mut ri, 3);
        LqhKeyReq::set_seq_no_replica(&mut ri, 2);
        LqhKeyReq::set_dirty_flag(&mut ri, 1);
        LqhKeyReq::set_rowid_flag(&mut ri, 1);
        LqhKeyReq::set_marker_flag(&mut ri, 1);

        assert_eq!(LqhKeyReq::get_key_len(ri), 300);
        assert_eq!(LqhKeyReq::get_lock_type(ri), 5);
        assert_eq!(LqhKeyReq::get_operation(ri), 3);
        assert_eq!(LqhKeyReq::get_seq_no_replica(ri), 2);
        assert_eq!(LqhKeyReq::get_dirty_flag(ri), 1);
        assert_eq!(LqhKeyReq::get_rowid_flag(ri), 1);
        assert_eq!(LqhKeyReq::get_marker_flag(ri), 1);
        assert_eq!(LqhKeyReq::get_simple_flag(ri), 0);
        assert_eq!(LqhKeyReq::get_interpreted_flag(ri), 0);

        // 清位不影响邻位
        LqhKeyReq::set_lock_type(&mut ri, 0);
        assert_eq!(LqhKeyReq::get_lock_type(ri), 0);
        assert_eq!(LqhKeyReq::get_key_len(ri), 300);
        assert_eq!(LqhKeyReq::get_operation(ri), 3);
    }

    #[test]
    fn test_long_request_info_bits() {
        let mut lri = 0u32;
        LqhKeyReq::set_no_triggers_flag(&mut lri, 1);
        LqhKeyReq::set_no_wait_flag(&mut lri, 1);
        assert_eq!(LqhKeyReq::get_no_triggers_flag(lri), 1);
        assert_eq!(LqhKeyReq::get_no_wait_flag(lri), 1);
        assert_eq!(LqhKeyReq::get_disable_fk_constraints(lri), 0);
        assert_eq!(LqhKeyReq::get_util_flag(lri), 0);
    }

    #[test]
    fn test_scan_info_bits() {
        let mut si = 0u32;
        LqhKeyReq::set_attr_len(&mut si, 4321);
        LqhKeyReq::set_distribution_key(&mut si, 200);
        LqhKeyReq::set_reorg_flag(&mut si, 1);
        assert_eq!(LqhKeyReq::get_attr_len(si), 4321);
        assert_eq!(LqhKeyReq::get_distribution_key(si), 200);
        assert_eq!(LqhKeyReq::get_reorg_flag(si), 1);
    }

    #[test]
    fn test_signal_round_trip() {
        let mut req = LqhKeyReq::default();
        req.client_connect_ptr = 77;
        req.trans_id1 = 0xDEAD;
        req.trans_id2 = 0xBEEF;
        LqhKeyReq::set_operation(&mut req.request_info, 2);

        let sig = req.to_signal(BlockRef::main(DBTC), BlockRef::new(DBLQH, 2)).unwrap();
        assert_eq!(sig.length(), LqhKeyReq::FIXED_SIGNAL_LENGTH);
        let back = LqhKeyReq::from_signal(&sig).unwrap();
        assert_eq!(back, req);
    }
}
