use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Configures the process-wide snowflake generator.
///
/// `machine_id` and `node_id` must each be in `0..32`. Only the first call
/// takes effect; a second bucket in the same millisecond would repeat ids.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if gen.is_none() {
        *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
    }
}

/// Returns a fresh id for a persisted row.
pub fn next_id() -> String {
    let mut gen = GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1))
        .get_id()
        .to_string()
}
