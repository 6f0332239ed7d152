//! 对外接口：状态查询、手动触发、日志、设置和连接测试

pub mod log;
pub mod settings;
pub mod sync;
