use std::fs;

use common::config::XtConfig;
use common::log::tracing_factory::TracingFactory;
use xtlog::database::Database;
use xtlog::record::{LogRecord, LogRecordType};
use xtlog::table::{RecHead, NIL_ID, TAB_STATUS_FIXED};
use xtlog::xlog::{LogPos, XlogWriter};

fn temp_config(tag: &str) -> XtConfig {
    let dir = std::env::temp_dir().join(format!("it_recovery_{}", tag));
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

/// 按序: INSERT_FL_BG + ROW_NEW_FL + ROW_ADD_REC + COMMIT + CLEANUP。
/// 恢复后: 表存在, 记录0有payload, 行0指向记录0, 事务10已清除。
#[test]
pub fn test_scenario_in_order_insert_commit_cleanup() {
    TracingFactory::init_log(true);
    let config = temp_config("scenario_a");

    let image = make_image(0, 10, b"hello-recovery");
    {
        let mut w = XlogWriter::open(&config, LogPos::new(1, 0)).unwrap();
        w.write(&LogRecord::NewTab { tab_id: 1 }).unwrap();
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::InsertFlBg,
            op_seq: 1,
            tab_id: 1,
            rec_id: 0,
            row_id: 0,
            xact_id: 10,
            free_rec_id: NIL_ID,
            image: image.clone(),
        }).unwrap();
        w.write(&LogRecord::RowNewFl { op_seq: 2, tab_id: 1, row_id: 0, free_row_id: NIL_ID }).unwrap();
        w.write(&LogRecord::RowAddRec { op_seq: 3, tab_id: 1, row_id: 0, rec_id: 0 }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 10 }).unwrap();
        w.write(&LogRecord::Cleanup { xact_id: 10 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    let (db, summary) = Database::open(config.clone()).unwrap();
    assert!(!summary.tail_corrupt);
    assert!(summary.bytes_read > 0);

    let mut tables = db.tables.lock().unwrap();
    let tab = tables.get(1).unwrap().expect("table 1 must exist");
    assert_eq!(tab.head_rec_eof_id, 1);
    assert_eq!(tab.head_row_eof_id, 1);
    assert_eq!(tab.head_op_seq, 3);
    assert_eq!(tab.row_get(0).unwrap(), 0);

    let rec = tab.read_rec(0, image.len()).unwrap();
    assert_eq!(rec, image);
    let head = tab.read_rec_head(0).unwrap();
    assert_eq!(head.xact_id, 10);
    assert_eq!(head.row_id, 0);
    drop(tables);

    // 事务10: CLEANUP后描述符不存在
    assert!(!db.xacts.contains(10));

    fs::remove_dir_all(config.db_path()).ok();
}

/// 日志尾失序: op缺失, 剩余op在日志尽头按放松规则应用。
/// INSERT_FL rec=42不在free链上: eof跳到43, 40..41补进free链。
#[test]
pub fn test_scenario_out_of_sequence_tail() {
    TracingFactory::init_log(true);
    let config = temp_config("scenario_b");

    {
        let mut w = XlogWriter::open(&config, LogPos::new(1, 0)).unwrap();
        w.write(&LogRecord::NewTab { tab_id: 1 }).unwrap();
        // op1按序: eof -> 40
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::Insert,
            op_seq: 1,
            tab_id: 1,
            rec_id: 39,
            row_id: 0,
            xact_id: 5,
            free_rec_id: 0,
            image: make_image(0, 5, b"base"),
        }).unwrap();
        // op2缺失; op3失序到达
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::InsertFl,
            op_seq: 3,
            tab_id: 1,
            rec_id: 42,
            row_id: 1,
            xact_id: 5,
            free_rec_id: NIL_ID,
            image: make_image(1, 5, b"tail"),
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 5 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    let (db, _summary) = Database::open(config.clone()).unwrap();
    let mut tables = db.tables.lock().unwrap();
    let tab = tables.get(1).unwrap().unwrap();

    assert_eq!(tab.head_rec_eof_id, 43);
    // head等于观察到的最大op
    assert_eq!(tab.head_op_seq, 3);
    // 40..41补到free链 (后进的41是链头)
    assert_eq!(tab.head_rec_free_id, 41);
    assert_eq!(tab.read_free_next(41).unwrap(), 40);
    assert_eq!(tab.read_free_next(40).unwrap(), NIL_ID);
    assert_eq!(tab.head_rec_fnum, 2);

    fs::remove_dir_all(config.db_path()).ok();
}

/// 同一checkpoint起点重放两遍, 记录/行文件逐字节一致。
#[test]
pub fn test_idempotent_replay() {
    TracingFactory::init_log(true);
    let config = temp_config("idempotent");

    {
        let mut w = XlogWriter::open(&config, LogPos::new(1, 0)).unwrap();
        w.write(&LogRecord::NewTab { tab_id: 1 }).unwrap();
        for i in 0..5u32 {
            w.write(&LogRecord::Mutation {
                kind: LogRecordType::Insert,
                op_seq: i + 1,
                tab_id: 1,
                rec_id: i,
                row_id: i,
                xact_id: 7,
                free_rec_id: 0,
                image: make_image(i, 7, format!("row-{}", i).as_bytes()),
            }).unwrap();
        }
        // rec 2释放后重用
        w.write(&LogRecord::RecFreed {
            kind: LogRecordType::RecFreed,
            op_seq: 6,
            tab_id: 1,
            rec_id: 2,
            xact_id: 7,
            stat_id: 1,
            next_rec_id: NIL_ID,
        }).unwrap();
        w.write(&LogRecord::Mutation {
            kind: LogRecordType::InsertFl,
            op_seq: 7,
            tab_id: 1,
            rec_id: 2,
            row_id: 9,
            xact_id: 7,
            free_rec_id: NIL_ID,
            image: make_image(9, 7, b"reused"),
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 7 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    let read_files = |config: &XtConfig| -> (Vec<u8>, Vec<u8>) {
        let rec = fs::read(config.tables_dir().join("1.xtr")).unwrap();
        let row = fs::read(config.tables_dir().join("1.xtd")).unwrap();
        (rec, row)
    };

    {
        let (_db, _s) = Database::open(config.clone()).unwrap();
    }
    let (rec1, row1) = read_files(&config);

    {
        let (_db, _s) = Database::open(config.clone()).unwrap();
    }
    let (rec2, row2) = read_files(&config);

    assert_eq!(rec1, rec2);
    assert_eq!(row1, row2);

    fs::remove_dir_all(config.db_path()).ok();
}

/// 空库: 读0字节, 按 (1, 0) 的合成checkpoint初始化。
#[test]
pub fn test_empty_database() {
    TracingFactory::init_log(true);
    let config = temp_config("empty");

    let (db, summary) = Database::open(config.clone()).unwrap();
    assert_eq!(summary.bytes_read, 0);
    assert_eq!(summary.end_pos, LogPos::new(1, 0));
    assert!(!summary.tail_corrupt);

    // 结构可用: 能写记录
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    assert_eq!(pos.log_id, 1);
    assert_eq!(db.curr_tab_id(), 1);

    fs::remove_dir_all(config.db_path()).ok();
}

/// 尾部截断: 回放停在最后一条好记录, 之前的都已应用。
#[test]
pub fn test_truncated_tail_stops_cleanly() {
    TracingFactory::init_log(true);
    let config = temp_config("trunc");

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
            xact_id: 3,
            free_rec_id: 0,
            image: make_image(0, 3, b"good"),
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 3 }).unwrap();
        end = w.write_head();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }
    // 截掉COMMIT的后半
    let path = config.xlog_dir().join("1.xtl");
    let f = fs::OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(end.offset - 3).unwrap();

    let (db, summary) = Database::open(config.clone()).unwrap();
    assert!(summary.tail_corrupt);
    assert!(summary.end_pos.offset < end.offset);

    // 好记录已应用
    let mut tables = db.tables.lock().unwrap();
    let tab = tables.get(1).unwrap().unwrap();
    assert_eq!(tab.head_rec_eof_id, 1);

    fs::remove_dir_all(config.db_path()).ok();
}
