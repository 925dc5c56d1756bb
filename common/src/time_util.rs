use chrono::Local;

/// 当前时间戳（毫秒）
pub fn unix_millis() -> i64 {
    Local::now().timestamp_millis()
}
