use std::collections::HashMap;

pub mod config;
pub mod filter;
pub mod header_policy;
pub mod salt;
pub mod sanitization;

/// Header name to the ordered values a request carried for it.
pub type RequestHeaders = HashMap<String, Vec<String>>;
