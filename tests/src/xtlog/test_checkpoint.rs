use std::fs;
use std::time::Duration;

use common::config::{FlushPaceMode, XtConfig};
use common::log::tracing_factory::TracingFactory;
use xtlog::checkpoint::{self, CheckpointRecord};
use xtlog::database::Database;
use xtlog::record::{LogRecord, LogRecordType};
use xtlog::recovery::RestartState;
use xtlog::table::{RecHead, NIL_ID, TAB_STATUS_FIXED};
use xtlog::xlog::{self, LogPos, XlogWriter};

fn temp_config(tag: &str) -> XtConfig {
    let dir = std::env::temp_dir().join(format!("it_checkpoint_{}", tag));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    XtConfig::with_db_path(dir.to_str().unwrap())
}

fn make_image(row_id: u32, xact_id: u32, payload: &[u8]) -> Vec<u8> {
    let head = RecHead {
        status: TAB_STATUS_FIXED,
        stat_id: 1,
        prev_rec_id: NIL_ID,
        xact_id,
        row_id,
    };
    let mut image = head.encode().to_vec();
    image.extend_from_slice(payload);
    image
}

fn cp_record(no: u64, pos: LogPos) -> CheckpointRecord {
    CheckpointRecord {
        checkpoint_no: no,
        restart_pos: pos,
        max_table_id: 1,
        max_xact_id: 1,
        ind_rec_pos: pos,
        deleted_log_ids: vec![],
    }
}

/// 槽选择: 两个都校验通过时restart位置靠后者赢;
/// 位置相同时checkpoint号大者赢; 损坏的槽被跳过。
#[test]
pub fn test_restart_slot_selection() {
    TracingFactory::init_log(true);
    let config = temp_config("slots");
    fs::create_dir_all(config.system_dir()).unwrap();

    let p1 = RestartState::restart_file_path(&config, 1);
    let p2 = RestartState::restart_file_path(&config, 2);

    // 位置优先
    cp_record(9, LogPos::new(2, 100)).write_to_file(&p1).unwrap();
    cp_record(3, LogPos::new(3, 0)).write_to_file(&p2).unwrap();
    let rs = RestartState::init(&config).unwrap();
    assert_eq!(rs.cp_pos, LogPos::new(3, 0));
    assert_eq!(rs.cp_number, 3);
    assert_eq!(rs.next_res_no, 1);

    // 位置相同: 编号大者
    cp_record(9, LogPos::new(3, 0)).write_to_file(&p1).unwrap();
    let rs = RestartState::init(&config).unwrap();
    assert_eq!(rs.cp_number, 9);
    assert_eq!(rs.next_res_no, 2);

    // 槽1损坏: 槽2赢
    let mut bytes = cp_record(20, LogPos::new(9, 0)).encode().unwrap();
    bytes[10] ^= 0xFF;
    fs::write(&p1, &bytes).unwrap();
    let rs = RestartState::init(&config).unwrap();
    assert_eq!(rs.cp_number, 3);
    assert_eq!(rs.cp_pos, LogPos::new(3, 0));

    fs::remove_dir_all(config.db_path()).ok();
}

/// 写后立即读: 刚写的槽在下次启动被选中, 恢复从它的位置开始。
#[test]
pub fn test_checkpoint_write_then_restart() {
    TracingFactory::init_log(true);
    let config = temp_config("write_restart");

    {
        let mut w = XlogWriter::open(&config, LogPos::new(1, 0)).unwrap();
        w.write(&LogRecord::NewTab { tab_id: 1 }).unwrap();
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::Insert,
            op_seq: 1,
            tab_id: 1,
            rec_id: 0,
            row_id: 0,
            xact_id: 4,
            free_rec_id: 0,
            image: make_image(0, 4, b"persisted"),
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 4 }).unwrap();
        w.write(&LogRecord::Cleanup { xact_id: 4 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    let full_bytes;
    {
        let (db, summary) = Database::open(config.clone()).unwrap();
        full_bytes = summary.bytes_read;
        assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
        let restart = db.restart.lock().unwrap();
        assert_eq!(restart.cp_number, 1);
        assert_eq!(restart.cp_pos, summary.end_pos);
    }

    // 重启: 从checkpoint位置恢复, 回放字节大幅减少
    let (db, summary) = Database::open(config.clone()).unwrap();
    assert!(summary.bytes_read < full_bytes);
    let mut tables = db.tables.lock().unwrap();
    let tab = tables.get(1).unwrap().unwrap();
    assert_eq!(tab.head_rec_eof_id, 1);
    assert_eq!(tab.head_op_seq, 1);

    fs::remove_dir_all(config.db_path()).ok();
}

/// checkpoint号单调递增, restart位置不回退。
#[test]
pub fn test_checkpoint_monotonicity() {
    TracingFactory::init_log(true);
    let config = temp_config("monotone");

    let (db, _) = Database::open(config.clone()).unwrap();
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 1 }, pos).unwrap();
    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
    let (no1, pos1) = {
        let r = db.restart.lock().unwrap();
        (r.cp_number, r.cp_pos)
    };

    let rec = LogRecord::Mutation {
        kind: LogRecordType::Insert,
        op_seq: 1,
        tab_id: 1,
        rec_id: 0,
        row_id: 0,
        xact_id: 2,
        free_rec_id: 0,
        image: make_image(0, 2, b"x"),
    };
    let pos = db.write_record(&rec).unwrap();
    db.apply_record(&rec, pos).unwrap();
    let pos = db.write_record(&LogRecord::Commit { xact_id: 2 }).unwrap();
    db.apply_record(&LogRecord::Commit { xact_id: 2 }, pos).unwrap();
    let pos = db.write_record(&LogRecord::Cleanup { xact_id: 2 }).unwrap();
    db.apply_record(&LogRecord::Cleanup { xact_id: 2 }, pos).unwrap();

    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
    let r = db.restart.lock().unwrap();
    assert!(r.cp_number > no1);
    assert!(!r.cp_pos.is_before(&pos1));

    fs::remove_dir_all(config.db_path()).ok();
}

/// 日志退休分两段: 第一次checkpoint只把到期文件列入记录,
/// 第二次checkpoint才物理删除; 保留min_log_files_to_keep个。
#[test]
pub fn test_log_retirement_keeps_configured_tail() {
    TracingFactory::init_log(true);
    let mut config = temp_config("retire");
    config.set_log_file_threshold(512);
    config.set_min_log_files_to_keep(2);

    let (db, _) = Database::open(config.clone()).unwrap();
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 1 }, pos).unwrap();

    for i in 0..60u32 {
        let rec = LogRecord::Mutation {
            kind: LogRecordType::Insert,
            op_seq: i + 1,
            tab_id: 1,
            rec_id: i,
            row_id: i,
            xact_id: 3,
            free_rec_id: 0,
            image: make_image(i, 3, &[0x5A; 40]),
        };
        let pos = db.write_record(&rec).unwrap();
        db.apply_record(&rec, pos).unwrap();
    }
    let pos = db.write_record(&LogRecord::Commit { xact_id: 3 }).unwrap();
    db.apply_record(&LogRecord::Commit { xact_id: 3 }, pos).unwrap();
    let pos = db.write_record(&LogRecord::Cleanup { xact_id: 3 }).unwrap();
    db.apply_record(&LogRecord::Cleanup { xact_id: 3 }, pos).unwrap();

    let head = db.xlog.lock().unwrap().write_head();
    assert!(head.log_id > 3, "log never rolled over");

    // 第一次checkpoint: 到期文件列入restart记录, 还在盘上
    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
    let (restart_log_id, listed) = {
        let r = db.restart.lock().unwrap();
        (r.cp_pos.log_id, r.pending_log_retire.clone())
    };
    assert!(!listed.is_empty());
    for id in &listed {
        assert!(*id + config.min_log_files_to_keep() < restart_log_id);
        assert!(config.xlog_dir().join(format!("{}.xtl", id)).exists(),
                "log {} was deleted before a checkpoint not listing it", id);
    }

    // 第二次checkpoint: 上一轮列出的被物理删除
    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
    let ids = xlog::list_log_ids(&config.xlog_dir()).unwrap();
    assert!(!ids.is_empty());
    for id in &listed {
        assert!(!ids.contains(id), "log {} still on disk after second checkpoint", id);
    }
    // 属性5: 留下的文件都在保留窗口内
    for id in &ids {
        assert!(*id + config.min_log_files_to_keep() >= restart_log_id,
                "log {} should have been retired (restart={})", id, restart_log_id);
    }
    assert!(ids.contains(&restart_log_id));

    fs::remove_dir_all(config.db_path()).ok();
}

/// 两次checkpoint N与N+1: N的to-delete列表在N+1完成后才物理消失;
/// N+1新列出的文件仍在盘上, 等下一次checkpoint。
#[test]
pub fn test_scenario_checkpoint_retirement() {
    TracingFactory::init_log(true);
    let mut config = temp_config("scenario_c");
    config.set_log_file_threshold(400);

    let (db, _) = Database::open(config.clone()).unwrap();
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 1 }, pos).unwrap();

    let write_batch = |xact_id: u32, ops: std::ops::Range<u32>| {
        for i in ops {
            let rec = LogRecord::Mutation {
                kind: LogRecordType::Insert,
                op_seq: i + 1,
                tab_id: 1,
                rec_id: i,
                row_id: i,
                xact_id,
                free_rec_id: 0,
                image: make_image(i, xact_id, &[0x3C; 40]),
            };
            let pos = db.write_record(&rec).unwrap();
            db.apply_record(&rec, pos).unwrap();
        }
        let pos = db.write_record(&LogRecord::Commit { xact_id }).unwrap();
        db.apply_record(&LogRecord::Commit { xact_id }, pos).unwrap();
        let pos = db.write_record(&LogRecord::Cleanup { xact_id }).unwrap();
        db.apply_record(&LogRecord::Cleanup { xact_id }, pos).unwrap();
    };

    // checkpoint N
    write_batch(11, 0..30);
    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
    let listed_n = db.restart.lock().unwrap().pending_log_retire.clone();
    assert!(!listed_n.is_empty());
    for id in &listed_n {
        assert!(config.xlog_dir().join(format!("{}.xtl", id)).exists());
    }

    // checkpoint N+1
    write_batch(12, 30..60);
    assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());

    // N列出的文件物理消失, id可复用
    for id in &listed_n {
        assert!(!config.xlog_dir().join(format!("{}.xtl", id)).exists(),
                "log {} should be gone after checkpoint N+1", id);
    }
    // N+1新列出的文件还在, 因为还没有之后的checkpoint退休它们
    let listed_n1 = db.restart.lock().unwrap().pending_log_retire.clone();
    assert!(!listed_n1.is_empty());
    for id in &listed_n1 {
        assert!(!listed_n.contains(id));
        assert!(config.xlog_dir().join(format!("{}.xtl", id)).exists(),
                "log {} retired too early", id);
    }
    // 当前restart所在的文件自然还在
    let restart_log_id = db.restart.lock().unwrap().cp_pos.log_id;
    assert!(config.xlog_dir().join(format!("{}.xtl", restart_log_id)).exists());

    fs::remove_dir_all(config.db_path()).ok();
}

/// 崩在flush中途: 记录文件已flush而索引没有。
/// 重启后索引位置落后, 索引redo把缺的项补齐。
#[test]
pub fn test_crash_mid_flush_index_redo() {
    TracingFactory::init_log(true);
    let config = temp_config("mid_flush");

    let image1 = make_image(0, 10, b"KEY-AAAA");
    let end;
    {
        let mut w = XlogWriter::open(&config, LogPos::new(1, 0)).unwrap();
        w.write(&LogRecord::NewTab { tab_id: 1 }).unwrap();
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::Insert,
            op_seq: 1,
            tab_id: 1,
            rec_id: 0,
            row_id: 0,
            xact_id: 10,
            free_rec_id: 0,
            image: image1.clone(),
        }).unwrap();
        w.write(&LogRecord::RowAddRec { op_seq: 2, tab_id: 1, row_id: 0, rec_id: 0 }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 10 }).unwrap();
        w.write(&LogRecord::Cleanup { xact_id: 10 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    {
        let (db, summary) = Database::open(config.clone()).unwrap();
        assert!(db.checkpoint(FlushPaceMode::NoPause).unwrap());
        end = summary.end_pos;
        drop(db);
    }

    // checkpoint之后的新修改
    let image2 = make_image(0, 11, b"KEY-BBBB");
    {
        let mut w = XlogWriter::open(&config, end).unwrap();
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::RecModified,
            op_seq: 3,
            tab_id: 1,
            rec_id: 0,
            row_id: 0,
            xact_id: 11,
            free_rec_id: 0,
            image: image2.clone(),
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 11 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }
    // 模拟崩溃点: 记录文件在盘上, 索引flush丢失
    fs::remove_file(config.tables_dir().join("1.xti")).unwrap();

    let (db, _) = Database::open(config.clone()).unwrap();
    let mut tables = db.tables.lock().unwrap();
    let tab = tables.get(1).unwrap().unwrap();

    // 记录是新值
    assert_eq!(tab.read_rec(0, image2.len()).unwrap(), image2);
    // 索引redo补上了与记录一致的项
    let key = tab.index.key_from_image(&image2);
    assert_eq!(tab.index.lookup(&key), vec![(0, 0)]);
    assert_eq!(tab.index.entry_count(), 1);

    fs::remove_dir_all(config.db_path()).ok();
}

/// checkpointer线程: 显式请求触发一轮checkpoint, 停机时再做一轮。
#[test]
pub fn test_checkpointer_thread() {
    TracingFactory::init_log(true);
    let config = temp_config("thread");

    let (db, _) = Database::open(config.clone()).unwrap();
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 1 }, pos).unwrap();

    let handle = checkpoint::start_checkpointer(std::sync::Arc::clone(&db));
    db.request_checkpoint();
    std::thread::sleep(Duration::from_millis(100));
    checkpoint::stop_checkpointer(&db, handle);

    // 至少一个restart槽已写出
    let p1 = RestartState::restart_file_path(&config, 1);
    let p2 = RestartState::restart_file_path(&config, 2);
    assert!(p1.exists() || p2.exists());
    let r = db.restart.lock().unwrap();
    assert!(r.cp_number >= 1);

    fs::remove_dir_all(config.db_path()).ok();
}
