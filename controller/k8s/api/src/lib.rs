#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;

pub use self::labels::Labels;
pub use k8s_openapi::{
    api::{
        self,
        coordination::v1::Lease,
        core::v1::{Namespace, ObjectReference, Service, ServiceSpec},
        networking::v1::NetworkPolicy,
    },
    apimachinery::pkg::apis::meta::v1::{OwnerReference, Time},
};
pub use kube::{
    api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error, Resource, ResourceExt,
};

/// Returns the controller owner reference of `meta`, if one is set.
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|oref| oref.controller == Some(true))
}

/// Indicates whether an API error describes a missing object.
pub fn is_not_found(error: &Error) -> bool {
    matches!(error, Error::Api(ErrorResponse { code: 404, .. }))
}
