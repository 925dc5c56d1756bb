use std::fs;

use common::config::XtConfig;
use common::log::tracing_factory::TracingFactory;
use xtlog::data_log::DataLogManager;
use xtlog::database::Database;
use xtlog::record::{LogRecord, LogRecordType};
use xtlog::table::{RecHead, NIL_ID, TAB_STATUS_EXT_DLOG};
use xtlog::xlog::{LogPos, XlogWriter};

fn temp_config(tag: &str) -> XtConfig {
    let dir = std::env::temp_dir().join(format!("it_datalog_{}", tag));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    XtConfig::with_db_path(dir.to_str().unwrap())
}

/// 扩展记录镜像: 记录头 + 数据日志指针 (log_id u16 + offset u48 + size u32)
fn make_ext_image(row_id: u32, xact_id: u32, dlog_id: u16, dlog_off: u64, dlog_size: u32) -> Vec<u8> {
    let head = RecHead {
        status: TAB_STATUS_EXT_DLOG,
        stat_id: 1,
        prev_rec_id: NIL_ID,
        xact_id,
        row_id,
    };
    let mut image = head.encode().to_vec();
    image.extend_from_slice(&dlog_id.to_le_bytes());
    image.extend_from_slice(&dlog_off.to_le_bytes()[..6]);
    image.extend_from_slice(&dlog_size.to_le_bytes());
    image
}

/// REC_REMOVED_EXT回放两遍: 第二遍观察到"not found", 继续,
/// 相邻extent不受波及。
#[test]
pub fn test_scenario_data_log_orphan() {
    TracingFactory::init_log(true);
    let config = temp_config("orphan");

    // 准备两个extent: 一个被删, 一个旁观
    let (dlog_id, dlog_off, neighbor_off);
    {
        let mut mgr = DataLogManager::open(&config).unwrap();
        let (l, o) = mgr.write(b"overflow-blob-data", 1, 0).unwrap();
        let (l2, o2) = mgr.write(b"neighbor", 1, 1).unwrap();
        assert_eq!(l, l2);
        dlog_id = l;
        dlog_off = o;
        neighbor_off = o2;
    }

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
            image: make_ext_image(0, 10, dlog_id as u16, dlog_off, 18),
        }).unwrap();
        w.write(&LogRecord::RecFreed {
            kind: LogRecordType::RecRemovedExt,
            op_seq: 2,
            tab_id: 1,
            rec_id: 0,
            xact_id: 10,
            stat_id: 1,
            next_rec_id: NIL_ID,
        }).unwrap();
        w.write(&LogRecord::Commit { xact_id: 10 }).unwrap();
        let head = w.write_head();
        w.flush_up_to(head).unwrap();
    }

    // 第一遍回放: extent被逻辑删除
    {
        let (db, _) = Database::open(config.clone()).unwrap();
        let data_logs = db.data_logs.lock().unwrap();
        assert!(data_logs.read(dlog_id, dlog_off).is_err());
        // 旁观extent原样
        assert_eq!(data_logs.read(dlog_id, neighbor_off).unwrap(), b"neighbor");
    }

    // 第二遍回放 (无checkpoint, 同一起点): 删除观察到"已删", 继续
    {
        let (db, summary) = Database::open(config.clone()).unwrap();
        assert!(!summary.tail_corrupt);
        let data_logs = db.data_logs.lock().unwrap();
        assert!(data_logs.read(dlog_id, dlog_off).is_err());
        assert_eq!(data_logs.read(dlog_id, neighbor_off).unwrap(), b"neighbor");
    }

    fs::remove_dir_all(config.db_path()).ok();
}

/// 删空的数据日志文件经两段式退休:
/// 列入checkpoint -> 物理删除 -> 下一次checkpoint后id可复用。
#[test]
pub fn test_data_log_two_phase_retirement() {
    TracingFactory::init_log(true);
    let mut config = temp_config("two_phase");
    // 小阈值让数据日志快速滚动
    config.set_log_file_threshold(64);

    let (db, _) = Database::open(config.clone()).unwrap();
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 1 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 1 }, pos).unwrap();

    // 第一个文件只装一个extent, 下一个写入触发滚动
    let (dlog_id, dlog_off) = {
        let mut data_logs = db.data_logs.lock().unwrap();
        let r = data_logs.write(b"to-be-dropped", 1, 0).unwrap();
        let (next_id, _) = data_logs.write(&[0u8; 64], 1, 1).unwrap();
        assert_ne!(next_id, r.0, "data log should have rolled over");
        r
    };
    {
        let mut data_logs = db.data_logs.lock().unwrap();
        data_logs.delete(dlog_id, dlog_off, 13, 1, 0).unwrap();
        // 删空: 进入to_delete, 等checkpoint落实
        assert!(data_logs.to_delete_snapshot().contains(&dlog_id));
    }

    // checkpoint落实物理删除
    assert!(db.checkpoint(common::config::FlushPaceMode::NoPause).unwrap());
    assert!(!config.dlog_dir().join(format!("{}.xtd", dlog_id)).exists());
    assert!(db.data_logs.lock().unwrap().deleted_count() >= 1);

    // 再一次checkpoint后id遗忘, 可复用
    let pos = db.write_record(&LogRecord::NewTab { tab_id: 2 }).unwrap();
    db.apply_record(&LogRecord::NewTab { tab_id: 2 }, pos).unwrap();
    assert!(db.checkpoint(common::config::FlushPaceMode::NoPause).unwrap());
    assert_eq!(db.data_logs.lock().unwrap().deleted_count(), 0);

    fs::remove_dir_all(config.db_path()).ok();
}
