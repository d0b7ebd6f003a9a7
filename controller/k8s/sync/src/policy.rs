//! Conversions between [`PolicySpec`] and the `NetworkPolicy` wire shape.
//!
//! Policies are written as server-side apply documents and read back from
//! typed `NetworkPolicy` objects. Anything the controller never writes (ports,
//! IP blocks, pod selectors in peers, label expressions) is treated as an
//! unrepresentable shape so that the reconciler overwrites it.

use microseg_controller_core::{ObservedPolicy, PolicySpec, ResourceId, Rule, Selector};
use microseg_controller_k8s_api::{self as k8s, labels::MANAGED_BY, Labels};
use serde_json::{json, Map, Value};

/// Builds the server-side apply document for a managed policy.
pub(crate) fn to_apply(
    id: &ResourceId,
    spec: &PolicySpec,
    owner: &k8s::OwnerReference,
    manager: &str,
) -> Value {
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": {
            "name": id.name,
            "namespace": id.namespace,
            "labels": { MANAGED_BY: manager },
            "ownerReferences": [owner],
        },
        "spec": {
            "podSelector": selector_json(&spec.pod_selector),
            "ingress": rules_json(&spec.ingress, "from"),
            "egress": rules_json(&spec.egress, "to"),
        },
    })
}

fn selector_json(selector: &Selector) -> Value {
    Labels::from(selector.clone()).to_selector_json()
}

fn rules_json(rules: &[Rule], peers: &str) -> Value {
    rules
        .iter()
        .map(|rule| {
            let mut obj = Map::new();
            obj.insert(
                peers.to_string(),
                json!([{ "namespaceSelector": selector_json(&rule.namespaces) }]),
            );
            Value::Object(obj)
        })
        .collect()
}

/// Reads the controller reference, the managed-by label and the representable spec of a policy.
pub(crate) fn observe(policy: &k8s::NetworkPolicy, manager: &str) -> ObservedPolicy {
    let controller_uid = k8s::controller_owner(&policy.metadata).map(|oref| oref.uid.clone());
    let managed = Labels::from(policy.metadata.labels.clone()).get(MANAGED_BY) == Some(manager);
    let spec = match policy.spec.as_ref().map(serde_json::to_value) {
        Some(Ok(spec)) => spec_from_json(&spec),
        Some(Err(_)) | None => None,
    };
    ObservedPolicy {
        spec,
        controller_uid,
        managed,
    }
}

fn spec_from_json(spec: &Value) -> Option<PolicySpec> {
    let pod_selector = match present(spec.get("podSelector")) {
        Some(selector) => selector_from_json(selector)?,
        None => Selector::default(),
    };
    Some(PolicySpec {
        pod_selector,
        ingress: rules_from_json(spec.get("ingress"), "from")?,
        egress: rules_from_json(spec.get("egress"), "to")?,
    })
}

fn rules_from_json(rules: Option<&Value>, peers: &str) -> Option<Vec<Rule>> {
    let Some(rules) = present(rules) else {
        return Some(Vec::new());
    };
    rules
        .as_array()?
        .iter()
        .map(|rule| {
            let rule = rule.as_object()?;
            if rule.keys().any(|k| k != peers && present(rule.get(k)).is_some()) {
                return None;
            }
            let [peer] = present(rule.get(peers))?.as_array()?.as_slice() else {
                return None;
            };
            let peer = peer.as_object()?;
            if peer
                .iter()
                .any(|(k, v)| k != "namespaceSelector" && !v.is_null())
            {
                return None;
            }
            let namespaces = selector_from_json(present(peer.get("namespaceSelector"))?)?;
            Some(Rule { namespaces })
        })
        .collect()
}

fn selector_from_json(selector: &Value) -> Option<Selector> {
    let selector = selector.as_object()?;
    match present(selector.get("matchExpressions")) {
        Some(Value::Array(exprs)) if exprs.is_empty() => {}
        Some(_) => return None,
        None => {}
    }
    let Some(labels) = present(selector.get("matchLabels")) else {
        return Some(Selector::default());
    };
    labels
        .as_object()?
        .iter()
        .map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
        .collect()
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANAGER: &str = "microsegmentation-controller";

    fn mk_owner() -> k8s::OwnerReference {
        k8s::OwnerReference {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
            name: "ns-a".to_string(),
            uid: "uid-ns-a".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }
    }

    fn mk_spec() -> PolicySpec {
        PolicySpec {
            pod_selector: Selector::default(),
            ingress: vec![
                Rule {
                    namespaces: selector("team", "x"),
                },
                Rule {
                    namespaces: selector("env", "prod"),
                },
            ],
            egress: vec![],
        }
    }

    fn selector(k: &str, v: &str) -> Selector {
        [(k.to_string(), v.to_string())].into_iter().collect()
    }

    fn from_server(value: Value) -> k8s::NetworkPolicy {
        serde_json::from_value(value).expect("policy must deserialize")
    }

    fn mk_policy(spec: Value) -> k8s::NetworkPolicy {
        from_server(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": { "name": "p", "namespace": "ns-a" },
            "spec": spec,
        }))
    }

    #[test]
    fn apply_document_shape() {
        let id = ResourceId::new("ns-a", "ingress-from-namespaces");
        let doc = to_apply(&id, &mk_spec(), &mk_owner(), MANAGER);
        assert_eq!(
            doc,
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {
                    "name": "ingress-from-namespaces",
                    "namespace": "ns-a",
                    "labels": { "app.kubernetes.io/managed-by": "microsegmentation-controller" },
                    "ownerReferences": [{
                        "apiVersion": "v1",
                        "kind": "Namespace",
                        "name": "ns-a",
                        "uid": "uid-ns-a",
                        "controller": true,
                    }],
                },
                "spec": {
                    "podSelector": {},
                    "ingress": [
                        { "from": [{ "namespaceSelector": { "matchLabels": { "team": "x" } } }] },
                        { "from": [{ "namespaceSelector": { "matchLabels": { "env": "prod" } } }] },
                    ],
                    "egress": [],
                },
            })
        );
    }

    #[test]
    fn server_defaults_are_ignored() {
        // The API server drops empty lists and fills in policyTypes.
        let policy = from_server(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {
                "name": "ingress-from-namespaces",
                "namespace": "ns-a",
                "labels": { "app.kubernetes.io/managed-by": MANAGER },
                "ownerReferences": [{
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "name": "ns-a",
                    "uid": "uid-ns-a",
                    "controller": true,
                }],
            },
            "spec": {
                "podSelector": {},
                "policyTypes": ["Ingress"],
                "ingress": [
                    { "from": [{ "namespaceSelector": { "matchLabels": { "team": "x" } } }] },
                    { "from": [{ "namespaceSelector": { "matchLabels": { "env": "prod" } } }] },
                ],
            },
        }));
        assert_eq!(
            observe(&policy, MANAGER),
            ObservedPolicy {
                spec: Some(mk_spec()),
                controller_uid: Some("uid-ns-a".to_string()),
                managed: true,
            }
        );
    }

    #[test]
    fn deny_by_default_is_an_empty_spec() {
        let policy = mk_policy(json!({ "podSelector": {} }));
        assert_eq!(
            observe(&policy, MANAGER),
            ObservedPolicy {
                spec: Some(PolicySpec::default()),
                controller_uid: None,
                managed: false,
            }
        );
    }

    #[test]
    fn unmanaged_shapes_are_unrepresentable() {
        let with_ports = mk_policy(json!({
            "podSelector": {},
            "ingress": [{
                "from": [{ "namespaceSelector": {} }],
                "ports": [{ "port": 80 }],
            }],
        }));
        assert_eq!(observe(&with_ports, MANAGER).spec, None);

        let with_expressions = mk_policy(json!({
            "podSelector": {
                "matchExpressions": [{ "key": "app", "operator": "Exists" }],
            },
        }));
        assert_eq!(observe(&with_expressions, MANAGER).spec, None);

        let with_pod_peer = mk_policy(json!({
            "podSelector": {},
            "egress": [{
                "to": [{
                    "namespaceSelector": {},
                    "podSelector": { "matchLabels": { "app": "web" } },
                }],
            }],
        }));
        assert_eq!(observe(&with_pod_peer, MANAGER).spec, None);
    }

    #[test]
    fn peers_without_namespace_selectors_are_unrepresentable() {
        let policy = mk_policy(json!({
            "podSelector": {},
            "ingress": [{ "from": [{ "podSelector": {} }] }],
        }));
        assert_eq!(observe(&policy, MANAGER).spec, None);
    }

    #[test]
    fn non_controller_references_are_not_controllers() {
        let policy = from_server(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {
                "name": "deny-by-default",
                "namespace": "ns-a",
                "ownerReferences": [{
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "name": "ns-a",
                    "uid": "uid-ns-a",
                }],
            },
            "spec": { "podSelector": {} },
        }));
        assert_eq!(observe(&policy, MANAGER).controller_uid, None);
    }

    #[test]
    fn managed_label_must_name_the_manager() {
        let labelled = |value: &str| {
            from_server(json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {
                    "name": "deny-by-default",
                    "namespace": "ns-a",
                    "labels": { "app.kubernetes.io/managed-by": value },
                },
                "spec": { "podSelector": {} },
            }))
        };
        assert!(observe(&labelled(MANAGER), MANAGER).managed);
        assert!(!observe(&labelled("someone-else"), MANAGER).managed);
        assert!(!observe(&mk_policy(json!({ "podSelector": {} })), MANAGER).managed);
    }
}
