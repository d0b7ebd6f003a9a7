#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use microseg_controller_core as core;
pub use microseg_controller_k8s_api as k8s;
pub use microseg_controller_k8s_index as index;
pub use microseg_controller_k8s_sync as sync;

mod args;
mod lease;

pub use self::args::Args;
