use common::err::engine_error::XtError;
use common::err::XResult;

use crate::block_ref::BlockRef;
use crate::signal::Signal;
use crate::signal_kind::SignalKind;

/// TCKEYREF: 事务协调器拒绝key操作。 5字。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcKeyRef {
    /// Operation pointer
    pub connect_ptr: u32,
    pub trans_id: [u32; 2],
    pub error_code: u32,
    pub error_data: u32,
}

impl TcKeyRef {
    pub const SIGNAL_LENGTH: usize = 5;

    pub fn to_signal(&self, sender: BlockRef, receiver: BlockRef) -> XResult<Signal> {
        Signal::new(SignalKind::TcKeyRef, sender, receiver,
                    &[self.connect_ptr, self.trans_id[0], self.trans_id[1], self.error_code, self.error_data])
    }

    pub fn from_signal(signal: &Signal) -> XResult<Self> {
        if signal.kind() != SignalKind::TcKeyRef {
            return Err(XtError::Bug(format!("expected TCKEYREF, got {}.", signal.kind().name())));
        }
        if signal.length() < Self::SIGNAL_LENGTH {
            return Err(XtError::Error(format!("TCKEYREF length {}.", signal.length())));
        }
        let w = signal.words();
        Ok(Self {
            connect_ptr: w[0],
            trans_id: [w[1], w[2]],
            error_code: w[3],
            error_data: w[4],
        })
    }
}
