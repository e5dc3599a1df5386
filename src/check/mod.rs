//! 检测定义模块
//!
//! 提供检测记录的数据结构和从原始存储记录到检测定义的校验转换

pub mod model;
pub mod validation;

// 重新导出主要类型
pub use model::{Check, CheckState, HttpMethod, Protocol, CHECK_ID_LENGTH, OWNER_REF_LENGTH};
pub use validation::validate_check;
