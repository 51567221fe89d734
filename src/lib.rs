pub mod logger;
pub mod tftp;
