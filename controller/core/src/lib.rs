//! Microsegmentation reconciliation core
//!
//! Owners (namespaces and services) opt into network isolation through a small set of
//! annotations. This crate turns those annotations into the set of `NetworkPolicy` objects that
//! should exist for the owner and drives the cluster toward that set:
//!
//! ```text
//! [ watch event ] -> EventFilter -> [ request ] -> Reconciler -> DesiredPolicies -> PolicyStore
//! ```
//!
//! Nothing here talks to the Kubernetes API directly. The object store and event recorder are
//! traits so that the same loop serves every owner kind and can be exercised in tests.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod filter;
pub mod labels;
pub mod owner;
pub mod policy;
pub mod reconcile;
mod resource_id;

pub use self::{
    annotations::OwnerAnnotations,
    filter::EventFilter,
    labels::{parse_label_list, ParseError},
    owner::{OwnerId, OwnerResource},
    policy::{Candidate, DesiredPolicies, PolicySpec, Rule, Selector},
    reconcile::{
        Change, Event, EventRecorder, ObservedPolicy, Outcome, PolicyStore, ReconcileConfig,
        Reconciler, StoreError,
    },
    resource_id::ResourceId,
};
