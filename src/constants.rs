/// 请求体上限：2 MiB
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// 记录列表默认条数
pub const DEFAULT_RECORD_LIMIT: usize = 50;

/// 记录列表最大条数
pub const MAX_RECORD_LIMIT: usize = 200;
