pub mod server;
pub mod session;
pub mod storage;
