#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod metrics;
mod policy;
mod recorder;
mod store;

pub use self::{
    controller::Controller,
    metrics::ControllerMetrics,
    recorder::KubeRecorder,
    store::{KubeStore, FIELD_MANAGER},
};
