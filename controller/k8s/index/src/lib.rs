//! Microsegmentation watch index
//!
//! The index consumes watches over the owner kinds (`Namespace` and `Service`) and over the
//! `NetworkPolicy` objects they own. It decides which watch events require a reconciliation and
//! publishes a [`Request`] for each of them:
//!
//! - An owner that appears for the first time is admitted if it enables microsegmentation.
//! - An owner that changes is admitted according to the [`EventFilter`]. The previously observed
//!   annotations are retained so that old and new states can be compared.
//! - An owner that is deleted is always admitted; reconciling it finds nothing to do.
//! - A policy that is changed or deleted re-enqueues its controlling owner, so that manual edits
//!   are reverted.
//!
//! The index also records which policies each owner controls.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod request;


pub use self::{
    index::{resync_on_claim, Index, SharedIndex},
    request::Request,
};
pub use microseg_controller_core::EventFilter;
