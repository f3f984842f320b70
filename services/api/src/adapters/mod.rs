pub mod db;
pub mod file_cache;

pub use db::PgRemoteStore;
pub use file_cache::FileCache;
