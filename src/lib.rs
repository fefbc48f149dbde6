pub mod archive;
pub mod binary;
pub mod checksum;
pub mod cleanup;
pub mod commands;
pub mod download;
pub mod formula;
pub mod http;
pub mod install;
pub mod platform;
pub mod resolve;
pub mod runtime;
pub mod verify;
