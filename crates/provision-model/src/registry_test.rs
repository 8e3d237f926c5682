#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::{Value, json};

    use crate::active_model::ActiveModel;
    use crate::error::ModelError;
    use crate::model::{ModelInstance, ModelKind, State};
    use crate::node::Node;
    use crate::policy::{Policy, PolicyTemplate};
    use crate::registry::{Persist, ProvisionObject, Registry, TYPE_FIELD};
    use crate::tag::{Comparator, TagRule};

    #[test]
    fn test_node_document_drops_transient_fields() {
        let registry = Registry::standard();
        let mut node = Node::new(vec!["00:11:22:33:44:55".to_string()]);
        node.tags = vec!["computed".to_string()];
        let doc = registry.to_document(&node).unwrap();
        assert_eq!(doc[TYPE_FIELD], Value::from("node"));
        assert!(!doc.contains_key("_tags"));

        let back: Node = registry.hydrate(doc).unwrap();
        assert!(back.tags.is_empty());
        assert_eq!(back.hw_id, node.hw_id);
    }

    #[test]
    fn test_tag_rule_children_are_tagged_and_hydrated() {
        let registry = Registry::standard();
        let mut rule = TagRule::new("big memory", "big");
        rule.add_matcher("memorysize", Comparator::Like, "^[0-9]{5}", false);
        let doc = registry.to_document(&rule).unwrap();
        assert_eq!(doc[TYPE_FIELD], Value::from("tag_rule"));
        assert_eq!(doc["tag_matchers"][0][TYPE_FIELD], Value::from("tag_matcher"));

        let back: TagRule = registry.hydrate(doc).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_active_model_embeds_tagged_model() {
        let registry = Registry::standard();
        let model = ModelInstance::new(ModelKind::Redhat6, "rh", "img1", BTreeMap::new());
        let mut active = ActiveModel::new("n1", "p1", "web", model);
        active.model.current_state = State::Postinstall;
        let doc = registry.to_document(&active).unwrap();
        assert_eq!(doc["model"][TYPE_FIELD], Value::from("model::redhat_6"));

        match registry.from_document(doc).unwrap() {
            ProvisionObject::ActiveModel(back) => {
                assert_eq!(back.model.current_state, State::Postinstall);
                assert_eq!(back.model.node_uuid.as_deref(), Some("n1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_policy_tag_names_template() {
        let registry = Registry::standard();
        let policy = Policy::new("xs", PolicyTemplate::XenserverHypervisor, "m1", vec![]);
        assert_eq!(policy.type_tag(), "policy::xenserver_hypervisor");
        let doc = registry.to_document(&policy).unwrap();
        let back: Policy = registry.hydrate(doc).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let registry = Registry::standard();
        let doc = json!({"@type": "policy::windows_deploy", "uuid": "x"});
        let Value::Object(doc) = doc else { unreachable!() };
        assert!(matches!(
            registry.from_document(doc),
            Err(ModelError::UnknownType(tag)) if tag == "policy::windows_deploy"
        ));
    }

    #[test]
    fn test_unknown_nested_tag_is_fatal() {
        let registry = Registry::standard();
        let doc = json!({
            "@type": "tag_rule",
            "uuid": "t1",
            "name": "n",
            "tag": "t",
            "tag_matchers": [{"@type": "mystery", "uuid": "m"}]
        });
        let Value::Object(doc) = doc else { unreachable!() };
        assert!(matches!(registry.from_document(doc), Err(ModelError::UnknownType(_))));
    }

    #[test]
    fn test_mismatched_tag_is_rejected() {
        let registry = Registry::standard();
        let policy = Policy::new("web", PolicyTemplate::LinuxDeploy, "m1", vec![]);
        let mut doc = registry.to_document(&policy).unwrap();
        doc.insert(TYPE_FIELD.to_string(), Value::from("policy::boot_mk"));
        assert!(registry.hydrate::<Policy>(doc).is_err());
    }

    #[test]
    fn test_missing_tag() {
        let registry = Registry::standard();
        let Value::Object(doc) = json!({"uuid": "x"}) else { unreachable!() };
        assert!(matches!(registry.from_document(doc), Err(ModelError::MissingTypeTag)));
    }

    #[test]
    fn test_hydrate_narrows_type() {
        let registry = Registry::standard();
        let node = Node::new(vec!["AA".to_string()]);
        let doc = registry.to_document(&node).unwrap();
        assert!(registry.hydrate::<Policy>(doc).is_err());
    }
}
