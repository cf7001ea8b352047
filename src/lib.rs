pub mod config;
pub mod context;
pub mod expression;
pub mod pool;
pub mod value;
