//! Aliyun OSS
//!
//! Custom domains are managed through the bucket's `?cname` sub-resource,
//! signed with OSS V4.

mod client;
mod signing;

pub use client::{AliyunOssClient, PLATFORM};
pub use signing::{AliyunCredentials, OssSigner, SigningRequest};
