//! Object Registry
//!
//! Closed mapping from type tags to constructors. Stored documents are
//! flat JSON maps carrying their concrete type under `@type`; nested typed
//! values (tag matchers inside a rule, the model inside an active model)
//! carry their own tag and are hydrated before their parent.
//!
//! Tags:
//! - `node`, `tag_rule`, `tag_matcher`, `policy_table`, `active_model`, `bmc`
//! - `policy::<template>`, `model::<kind>`, `broker::<plugin>`, `image::<kind>`

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::active_model::ActiveModel;
use crate::bmc::Bmc;
use crate::broker::{Broker, BrokerPluginKind};
use crate::error::ModelError;
use crate::image::{ImageKind, ImageRecord};
use crate::model::{ModelInstance, ModelKind};
use crate::node::Node;
use crate::policy::{Policy, PolicyTable, PolicyTemplate};
use crate::tag::{TagMatcher, TagRule};

/// Key holding the concrete type tag
pub const TYPE_FIELD: &str = "@type";

/// Builds a typed object from an untagged JSON value
pub type Constructor = fn(Value) -> Result<ProvisionObject, ModelError>;

/// Every concrete type the registry can hydrate
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionObject {
    Node(Node),
    TagRule(TagRule),
    TagMatcher(TagMatcher),
    Policy(Policy),
    PolicyTable(PolicyTable),
    Model(ModelInstance),
    ActiveModel(ActiveModel),
    Broker(Broker),
    Bmc(Bmc),
    Image(ImageRecord),
}

impl ProvisionObject {
    pub fn type_tag(&self) -> String {
        match self {
            Self::Node(v) => v.type_tag(),
            Self::TagRule(v) => v.type_tag(),
            Self::TagMatcher(_) => "tag_matcher".to_string(),
            Self::Policy(v) => v.type_tag(),
            Self::PolicyTable(v) => v.type_tag(),
            Self::Model(v) => v.type_tag(),
            Self::ActiveModel(v) => v.type_tag(),
            Self::Broker(v) => v.type_tag(),
            Self::Bmc(v) => v.type_tag(),
            Self::Image(v) => v.type_tag(),
        }
    }

    /// Untagged JSON form
    pub fn to_value(&self) -> Result<Value, ModelError> {
        let value = match self {
            Self::Node(v) => serde_json::to_value(v)?,
            Self::TagRule(v) => serde_json::to_value(v)?,
            Self::TagMatcher(v) => serde_json::to_value(v)?,
            Self::Policy(v) => serde_json::to_value(v)?,
            Self::PolicyTable(v) => serde_json::to_value(v)?,
            Self::Model(v) => serde_json::to_value(v)?,
            Self::ActiveModel(v) => serde_json::to_value(v)?,
            Self::Broker(v) => serde_json::to_value(v)?,
            Self::Bmc(v) => serde_json::to_value(v)?,
            Self::Image(v) => serde_json::to_value(v)?,
        };
        Ok(value)
    }
}

/// A top-level object stored in its own collection
pub trait Persist: Serialize + DeserializeOwned + Into<ProvisionObject> + Sized {
    /// Store collection holding objects of this type
    const COLLECTION: &'static str;

    fn uuid(&self) -> &str;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);

    /// Concrete registry tag for this value
    fn type_tag(&self) -> String;

    /// Adds tags to nested typed values of a serialized document
    fn tag_children(&self, _doc: &mut Map<String, Value>) {}

    fn from_object(object: ProvisionObject) -> Result<Self, ModelError>;
}

macro_rules! persist {
    ($ty:ty, $variant:ident, $collection:expr, $tag:expr $(, children = $children:expr)?) => {
        impl From<$ty> for ProvisionObject {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }

        impl Persist for $ty {
            const COLLECTION: &'static str = $collection;

            fn uuid(&self) -> &str {
                &self.uuid
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }

            fn type_tag(&self) -> String {
                let tag: fn(&$ty) -> String = $tag;
                tag(self)
            }

            $(
                fn tag_children(&self, doc: &mut Map<String, Value>) {
                    let children: fn(&$ty, &mut Map<String, Value>) = $children;
                    children(self, doc);
                }
            )?

            fn from_object(object: ProvisionObject) -> Result<Self, ModelError> {
                match object {
                    ProvisionObject::$variant(value) => Ok(value),
                    other => Err(ModelError::UnknownType(other.type_tag())),
                }
            }
        }
    };
}

persist!(Node, Node, "node", |_| "node".to_string());
persist!(TagRule, TagRule, "tag", |_| "tag_rule".to_string(), children = |_, doc| {
    if let Some(Value::Array(matchers)) = doc.get_mut("tag_matchers") {
        for matcher in matchers.iter_mut().filter_map(Value::as_object_mut) {
            matcher.insert(TYPE_FIELD.to_string(), Value::from("tag_matcher"));
        }
    }
});
persist!(Policy, Policy, "policy", |p| format!("policy::{}", p.template));
persist!(PolicyTable, PolicyTable, "policy_table", |_| "policy_table".to_string());
persist!(ModelInstance, Model, "model", |m| format!("model::{}", m.kind));
persist!(ActiveModel, ActiveModel, "active", |_| "active_model".to_string(), children = |am, doc| {
    if let Some(Value::Object(model)) = doc.get_mut("model") {
        model.insert(TYPE_FIELD.to_string(), Value::from(am.model.type_tag()));
    }
});
persist!(Broker, Broker, "broker", |b| format!("broker::{}", b.plugin));
persist!(Bmc, Bmc, "bmc", |_| "bmc".to_string());
persist!(ImageRecord, Image, "images", |i| format!("image::{}", i.kind));

impl From<TagMatcher> for ProvisionObject {
    fn from(value: TagMatcher) -> Self {
        Self::TagMatcher(value)
    }
}

fn construct<T>(value: Value) -> Result<ProvisionObject, ModelError>
where
    T: DeserializeOwned + Into<ProvisionObject>,
{
    Ok(serde_json::from_value::<T>(value)?.into())
}

/// Type tag to constructor table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    constructors: HashMap<String, Constructor>,
}

impl Registry {
    /// Registry with every built-in type
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("node", construct::<Node>);
        registry.register("tag_rule", construct::<TagRule>);
        registry.register("tag_matcher", construct::<TagMatcher>);
        registry.register("policy_table", construct::<PolicyTable>);
        registry.register("active_model", construct::<ActiveModel>);
        registry.register("bmc", construct::<Bmc>);
        for template in [
            PolicyTemplate::LinuxDeploy,
            PolicyTemplate::XenserverHypervisor,
            PolicyTemplate::BootMk,
        ] {
            registry.register(&format!("policy::{template}"), construct::<Policy>);
        }
        for kind in ModelKind::ALL {
            registry.register(&format!("model::{kind}"), construct::<ModelInstance>);
        }
        for plugin in BrokerPluginKind::ALL {
            registry.register(&format!("broker::{plugin}"), construct::<Broker>);
        }
        for kind in ImageKind::ALL {
            registry.register(&format!("image::{kind}"), construct::<ImageRecord>);
        }
        registry
    }

    pub fn register(&mut self, tag: &str, constructor: Constructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Serializes `object` into a tagged document.
    ///
    /// Top-level keys starting with `_` are transient and dropped.
    pub fn to_document<T: Persist>(&self, object: &T) -> Result<Map<String, Value>, ModelError> {
        let mut doc = match serde_json::to_value(object)? {
            Value::Object(map) => map,
            other => return Err(ModelError::NotAnObject(other.to_string())),
        };
        doc.retain(|key, _| !key.starts_with('_'));
        object.tag_children(&mut doc);
        doc.insert(TYPE_FIELD.to_string(), Value::from(object.type_tag()));
        self.check_tags(&Value::Object(doc.clone()))?;
        Ok(doc)
    }

    fn check_tags(&self, value: &Value) -> Result<(), ModelError> {
        match value {
            Value::Object(map) => {
                if let Some(tag) = map.get(TYPE_FIELD).and_then(Value::as_str) {
                    if !self.contains(tag) {
                        return Err(ModelError::UnknownType(tag.to_string()));
                    }
                }
                map.values().try_for_each(|v| self.check_tags(v))
            }
            Value::Array(items) => items.iter().try_for_each(|v| self.check_tags(v)),
            _ => Ok(()),
        }
    }

    /// Hydrates a tagged document, nested tagged values first
    pub fn from_document(&self, doc: Map<String, Value>) -> Result<ProvisionObject, ModelError> {
        let tag = doc
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingTypeTag)?
            .to_string();
        self.hydrate_tagged(&tag, doc)
    }

    /// Hydrates a document and narrows it to `T`
    pub fn hydrate<T: Persist>(&self, doc: Map<String, Value>) -> Result<T, ModelError> {
        T::from_object(self.from_document(doc)?)
    }

    fn hydrate_tagged(
        &self,
        tag: &str,
        mut doc: Map<String, Value>,
    ) -> Result<ProvisionObject, ModelError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| ModelError::UnknownType(tag.to_string()))?;
        doc.remove(TYPE_FIELD);
        for value in doc.values_mut() {
            self.hydrate_nested(value)?;
        }
        let object = constructor(Value::Object(doc))?;
        if object.type_tag() != tag {
            return Err(ModelError::UnknownType(format!(
                "{tag} (document describes {})",
                object.type_tag()
            )));
        }
        Ok(object)
    }

    fn hydrate_nested(&self, value: &mut Value) -> Result<(), ModelError> {
        match value {
            Value::Object(map) => {
                let tag = map.get(TYPE_FIELD).and_then(Value::as_str).map(str::to_string);
                if let Some(tag) = tag {
                    let object = self.hydrate_tagged(&tag, std::mem::take(map))?;
                    *value = object.to_value()?;
                } else {
                    for child in map.values_mut() {
                        self.hydrate_nested(child)?;
                    }
                }
                Ok(())
            }
            Value::Array(items) => items.iter_mut().try_for_each(|v| self.hydrate_nested(v)),
            _ => Ok(()),
        }
    }
}
