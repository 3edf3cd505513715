pub mod canvas;
pub mod classify;
pub mod config;
pub mod exec;
pub mod init;
pub mod tools;
