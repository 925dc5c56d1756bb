use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use common::unix_millis;

use crate::record::LogRecord;
use crate::database::Database;
use crate::xact::XactFlags;

/// sweeper空转等待
pub const SWEEPER_POLL_MS: u64 = 400;
/// 事务结束多久后可清理 (毫秒)
pub const SWEEP_DELAY_MS: i64 = 200;

/////////////////////////////////////
/// Sweeper: 事务清理线程。
///
/// 找出已结束且到期的事务, 写CLEANUP记录并删除描述符。
/// 描述符一旦删除, checkpoint不再为它回撤restart position,
/// 对应的日志文件才能退休。
/////////////////////////////////////
pub fn start_sweeper(db: Arc<Database>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("xt-sweeper".to_string())
        .spawn(move || sweeper_main(db))
        .unwrap()
}

fn sweeper_main(db: Arc<Database>) {
    info!("sweeper started.");
    while !db.quit_requested() {
        match sweep_once(&db) {
            Ok(0) => thread::sleep(Duration::from_millis(SWEEPER_POLL_MS)),
            Ok(n) => debug!("sweeper cleaned {} transactions.", n),
            Err(e) if e.is_transient() => {
                // 资源类错误: 退避重试
                warn!("sweeper backing off: {}.", e);
                thread::sleep(Duration::from_millis(SWEEPER_POLL_MS));
            }
            Err(e) => {
                warn!("sweeper: {}.", e);
                thread::sleep(Duration::from_millis(SWEEPER_POLL_MS));
            }
        }
    }
    info!("sweeper stopped.");
}

/// 清理一轮到期事务。 返回清理数。
pub fn sweep_once(db: &Arc<Database>) -> common::err::XResult<usize> {
    let now = unix_millis();
    let mut cleaned = 0usize;
    for x in db.xacts.ended_snapshot() {
        if db.quit_requested() {
            break;
        }
        if !x.flags.contains(XactFlags::ENDED) || x.flags.contains(XactFlags::CLEANED) {
            continue;
        }
        if now - x.end_time < SWEEP_DELAY_MS {
            continue;
        }
        db.write_record(&LogRecord::Cleanup { xact_id: x.id })?;
        cleaned += 1;
    }
    Ok(cleaned)
}

pub fn stop_sweeper(db: &Arc<Database>, handle: JoinHandle<()>) {
    db.request_quit();
    let _ = handle.join();
}
