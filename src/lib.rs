pub mod addr;
pub mod config;
pub mod diff;
pub mod error;
pub mod grant;
pub mod op;
pub mod parser;
pub mod privilege;
pub mod reconciler;
pub mod resource;
pub mod session;
pub mod util;
