pub mod memory;
pub mod redis_backend;
pub mod single_flight;

pub use memory::MemoryCache;
pub use redis_backend::RedisCache;
pub use single_flight::AnalysisCache;
