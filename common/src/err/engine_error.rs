use std::fmt::Display;
use std::{fmt, io};
use std::num::ParseIntError;

#[derive(Debug)]
pub enum XtError {
    //////////////////////
    // Common
    //////////////////////
    /// 一定不会出现的异常。如果出现，一定是BUG
    Bug(String),
    /// Recoverable engine error
    Error(String),
    String(String),

    //////////////////////
    // Transient resource
    //////////////////////
    /// 资源暂时不可用（fd耗尽、file busy、内存不足、软盘满）。
    /// The caller backs off and retries, no state is regressed.
    Busy(String),

    //////////////////////
    // Structural corruption
    //////////////////////
    /// Bad magic, bad checksum or a partial tail record.
    /// Carries the position of the last good byte.
    Corrupt {
        log_id: u32,
        log_offset: u64,
        reason: String,
    },

    //////////////////////
    // Logical not-found (soft)
    //////////////////////
    /// 更新已删除的表。 Log and continue.
    TableNotFound(u32),
    /// Delete of an already-deleted data log extent.
    DataLogNotFound(u32),
    /// The extended record reference did not match the extent.
    BadExtRecord(String),

    //////////////////////
    // Fatal
    //////////////////////
    /// Refuse to start / transition to read-only drain.
    Fatal(String),

    //////////////////////
    // IO
    //////////////////////
    IoError(io::Error),
    ParseIntError(ParseIntError),
}

impl XtError {
    /// 软错误：记录日志后可忽略继续。
    pub fn is_soft(&self) -> bool {
        matches!(self,
            XtError::TableNotFound(_) | XtError::DataLogNotFound(_) | XtError::BadExtRecord(_))
    }

    /// Transient resource errors ask the caller to retry after backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, XtError::Busy(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, XtError::Fatal(_))
    }
}

impl Display for XtError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            XtError::Bug(s) | XtError::Error(s) | XtError::String(s)
            | XtError::Busy(s) | XtError::BadExtRecord(s) | XtError::Fatal(s) => {
                write!(f, "{}", s)
            }
            XtError::Corrupt { log_id, log_offset, reason } => {
                write!(f, "corrupt at {}-{}: {}", log_id, log_offset, reason)
            }
            XtError::TableNotFound(tab_id) => {
                write!(f, "table {} not found", tab_id)
            }
            XtError::DataLogNotFound(log_id) => {
                write!(f, "data log {} not found", log_id)
            }
            XtError::IoError(err) => {
                write!(f, "{}", err.to_string())
            }
            XtError::ParseIntError(err) => {
                write!(f, "{}", err.to_string())
            }
        }
    }
}

impl From<io::Error> for XtError {
    fn from(error: io::Error) -> Self {
        // 系统资源类的IO错误按 transient 处理
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory => {
                XtError::Busy(error.to_string())
            }
            _ => XtError::IoError(error),
        }
    }
}

impl From<ParseIntError> for XtError {
    fn from(error: ParseIntError) -> Self {
        XtError::ParseIntError(error)
    }
}
