//! Administrative operations
//!
//! CRUD over policies, models, brokers, tag rules, nodes, active models,
//! BMCs and images. Every operation takes a typed option struct that the
//! HTTP layer deserializes from the request body; validation failures carry
//! stable, human-readable messages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use provision_model::{
    ActiveModel, Bmc, Broker, BrokerPluginKind, Comparator, ImageKind, ImageRecord, LogEntry,
    ModelInstance, ModelKind, NO_BROKER, Node, Persist, Policy, PolicyTemplate, TagMatcher, TagRule,
    apply_metadata, broker_fields, model_fields, now_timestamp,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bmc::IpmiQuery;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::tagging::matched_tags;

/// Option value sent as a string, number or boolean
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Text(String),
    Number(i64),
    Flag(bool),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

/// Tags as a comma list or an array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Joined(String),
}

impl TagsInput {
    pub fn tags(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(tags) => tags.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    pub label: Option<String>,
    pub template: Option<String>,
    pub model_uuid: Option<String>,
    pub broker_uuid: Option<String>,
    pub tags: Option<TagsInput>,
    pub enabled: Option<OptionValue>,
    pub maximum: Option<OptionValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyUpdate {
    pub label: Option<String>,
    pub model_uuid: Option<String>,
    pub broker_uuid: Option<String>,
    pub tags: Option<TagsInput>,
    pub enabled: Option<OptionValue>,
    pub maximum: Option<OptionValue>,
    pub new_line_number: Option<OptionValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub label: Option<String>,
    pub template: Option<String>,
    pub image_uuid: Option<String>,
    pub req_metadata_hash: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelUpdate {
    pub label: Option<String>,
    pub image_uuid: Option<String>,
    pub req_metadata_hash: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
    pub name: Option<String>,
    pub plugin: Option<String>,
    pub description: Option<String>,
    pub req_metadata_hash: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub req_metadata_hash: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagRuleOptions {
    pub name: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatcherOptions {
    pub key: Option<String>,
    pub compare: Option<String>,
    pub value: Option<String>,
    pub inverse: Option<OptionValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BmcRegistration {
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub kernel: Option<String>,
    pub initrd: Option<String>,
    pub description: Option<String>,
}

/// Name and description of a template or plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// One line of the aggregate active model log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogViewEntry {
    pub active_model_uuid: String,
    pub node_uuid: String,
    pub label: String,
    #[serde(flatten)]
    pub entry: LogEntry,
}

fn require(value: Option<String>, message: &str) -> Result<String, EngineError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::MissingArgument(message.to_string()))
}

fn parse_enabled(value: &OptionValue) -> Result<bool, EngineError> {
    match value.to_string().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EngineError::InputError(
            "Enabled flag must have a value of 'true' or 'false'".to_string(),
        )),
    }
}

/// The text must be exactly an integer (no padding or sign games) and ≥ 0
fn parse_maximum(value: &OptionValue) -> Result<u32, EngineError> {
    let text = value.to_string();
    let parsed: i64 = text
        .parse()
        .ok()
        .filter(|n: &i64| n.to_string() == text)
        .ok_or_else(|| EngineError::InputError("Policy maximum count must be a valid integer".to_string()))?;
    u32::try_from(parsed)
        .map_err(|_| EngineError::InputError("Policy maximum count must be > 0".to_string()))
}

fn parse_inverse(value: Option<&OptionValue>) -> Result<bool, EngineError> {
    match value.map(ToString::to_string).as_deref() {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(_) => Err(EngineError::MissingArgument(
            "Option for --inverse must be [true|false]".to_string(),
        )),
    }
}

fn parse_compare(value: &str) -> Result<Comparator, EngineError> {
    Comparator::from_str(value).map_err(|_| {
        EngineError::MissingArgument("Option for --compare must be [equal|like]".to_string())
    })
}

fn required_tags(tags: Option<&TagsInput>, message: &str) -> Result<Vec<String>, EngineError> {
    let tags = tags.map(TagsInput::tags).unwrap_or_default();
    if tags.is_empty() {
        Err(EngineError::MissingArgument(message.to_string()))
    } else {
        Ok(tags)
    }
}

impl Engine {
    async fn not_found<T: Persist>(&self, uuid: &str, what: &str) -> Result<T, EngineError> {
        self.data.ensure_connected().await?;
        self.data
            .fetch::<T>(uuid)
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot Find {what} with UUID: [{uuid}]")))
    }

    async fn remove_one<T: Persist>(&self, uuid: &str, what: &str) -> Result<(), EngineError> {
        self.not_found::<T>(uuid, what).await?;
        self.data.remove::<T>(uuid).await?;
        info!("{} [{}] removed", what, uuid);
        Ok(())
    }

    async fn check_broker(&self, broker_uuid: &str) -> Result<(), EngineError> {
        if broker_uuid == NO_BROKER || self.data.fetch::<Broker>(broker_uuid).await?.is_some() {
            Ok(())
        } else {
            Err(EngineError::InvalidUuid(format!("Invalid Broker UUID [{broker_uuid}]")))
        }
    }

    // ---- policies ----

    pub fn policy_templates(&self) -> Vec<TemplateInfo> {
        PolicyTemplate::visible()
            .map(|t| TemplateInfo {
                name: t.as_str(),
                description: t.description(),
            })
            .collect()
    }

    /// Creates a policy and appends it to the policy table
    pub async fn add_policy(&self, opts: PolicyOptions) -> Result<Policy, EngineError> {
        self.data.ensure_connected().await?;
        let template_name = opts.template.unwrap_or_default();
        let template = PolicyTemplate::from_str(&template_name)
            .ok()
            .filter(|t| !t.is_hidden())
            .ok_or_else(|| {
                EngineError::InvalidPolicyTemplate(format!("Policy Template is not valid [{template_name}]"))
            })?;
        let label = require(opts.label, "Must Provide Label [label]")?;
        let model_uuid = require(opts.model_uuid, "Must Provide Model UUID [model_uuid]")?;
        let model = self
            .data
            .fetch::<ModelInstance>(&model_uuid)
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Invalid Model UUID [{model_uuid}]")))?;
        if model.kind.template() != template {
            return Err(EngineError::InputError(format!(
                "Invalid Model Type [{}] != [{template}]",
                model.kind.template()
            )));
        }
        let broker_uuid = opts.broker_uuid.unwrap_or_else(|| NO_BROKER.to_string());
        self.check_broker(&broker_uuid).await?;
        let tags = required_tags(opts.tags.as_ref(), "Must provide at least one tag [tags]")?;
        let maximum = opts.maximum.as_ref().map_or(Ok(0), parse_maximum)?;
        let enabled = opts.enabled.as_ref().map_or(Ok(false), parse_enabled)?;

        let mut policy = Policy::new(label, template, model_uuid, tags);
        policy.broker_uuid = broker_uuid;
        policy.maximum = maximum;
        policy.enabled = enabled;
        self.data.persist(&mut policy).await?;
        self.policies.add(&policy.uuid).await?;
        info!("Policy '{}' created ({})", policy.label, policy.uuid);
        Ok(policy)
    }

    pub async fn update_policy(&self, uuid: &str, opts: PolicyUpdate) -> Result<Policy, EngineError> {
        self.data.ensure_connected().await?;
        let current = self
            .data
            .fetch::<Policy>(uuid)
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Invalid Policy UUID [{uuid}]")))?;
        if opts.label.as_deref().is_some_and(|label| label.trim().is_empty()) {
            return Err(EngineError::MissingArgument("Policy Label must not be blank".to_string()));
        }

        let tags = match opts.tags.as_ref() {
            Some(tags) => Some(required_tags(Some(tags), "Policy Tags [tag(,tag)]")?),
            None => None,
        };
        if let Some(model_uuid) = opts.model_uuid.as_deref() {
            let model = self
                .data
                .fetch::<ModelInstance>(model_uuid)
                .await?
                .ok_or_else(|| EngineError::InvalidUuid(format!("Invalid Model UUID [{model_uuid}]")))?;
            if model.kind.template() != current.template {
                return Err(EngineError::InputError(format!("Invalid Model Type [{}]", model.label)));
            }
        }
        if let Some(broker_uuid) = opts.broker_uuid.as_deref() {
            self.check_broker(broker_uuid).await?;
        }
        let new_line_number = match opts.new_line_number.as_ref() {
            Some(value) => {
                let text = value.to_string().trim().to_string();
                let integer = Regex::new(r"^[+-]?\d+$").map_err(|e| EngineError::Internal(e.to_string()))?;
                if !integer.is_match(&text) {
                    return Err(EngineError::InputError(format!("New index '{text}' is not an integer")));
                }
                Some(
                    text.parse::<i64>()
                        .map_err(|e| EngineError::InputError(format!("New index '{text}': {e}")))?,
                )
            }
            None => None,
        };
        let enabled = opts.enabled.as_ref().map(parse_enabled).transpose()?;
        let maximum = opts.maximum.as_ref().map(parse_maximum).transpose()?;

        if let Some(index) = new_line_number {
            let count = self.policies.ordered().await?.len();
            if !usize::try_from(index).is_ok_and(|idx| idx < count) {
                return Err(EngineError::InputError(format!(
                    "New line number '{index}' is not valid; should be an between 0 and {}",
                    count.saturating_sub(1)
                )));
            }
        }

        let (policy, ()) = self
            .update::<Policy, _, _>(uuid, |p| {
                if let Some(label) = &opts.label {
                    p.label.clone_from(label);
                }
                if let Some(model_uuid) = &opts.model_uuid {
                    p.model_uuid.clone_from(model_uuid);
                }
                if let Some(broker_uuid) = &opts.broker_uuid {
                    p.broker_uuid.clone_from(broker_uuid);
                }
                if let Some(tags) = &tags {
                    p.tags.clone_from(tags);
                }
                if let Some(enabled) = enabled {
                    p.enabled = enabled;
                }
                if let Some(maximum) = maximum {
                    p.maximum = maximum;
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Invalid Policy UUID [{uuid}]")))?;
        if let Some(index) = new_line_number {
            self.policies.move_to_index(uuid, index).await?;
        }
        Ok(policy)
    }

    pub async fn get_policy(&self, uuid: &str) -> Result<Policy, EngineError> {
        self.not_found(uuid, "Policy").await
    }

    /// Policies in precedence order
    pub async fn list_policies(&self) -> Result<Vec<Policy>, EngineError> {
        self.data.ensure_connected().await?;
        self.policies.ordered().await
    }

    pub async fn remove_policy(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<Policy>(uuid, "Policy").await?;
        self.policies.remove(uuid).await?;
        Ok(())
    }

    pub async fn remove_all_policies(&self) -> Result<(), EngineError> {
        self.data.ensure_connected().await?;
        self.data.remove_all::<Policy>().await?;
        self.policies.compact().await?;
        info!("All policies removed");
        Ok(())
    }

    // ---- models ----

    pub fn model_templates(&self) -> Vec<TemplateInfo> {
        ModelKind::ALL
            .into_iter()
            .map(|k| TemplateInfo {
                name: k.as_str(),
                description: k.description(),
            })
            .collect()
    }

    async fn check_image(&self, kind: ModelKind, image_uuid: &str) -> Result<(), EngineError> {
        let image = self
            .data
            .fetch::<ImageRecord>(image_uuid)
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Invalid Image UUID [{image_uuid}]")))?;
        if image.kind == kind.image_kind() {
            Ok(())
        } else {
            Err(EngineError::InputError(format!(
                "Image [{image_uuid}] is a {} image; model [{kind}] needs {}",
                image.kind,
                kind.image_kind()
            )))
        }
    }

    pub async fn add_model(&self, opts: ModelOptions) -> Result<ModelInstance, EngineError> {
        self.data.ensure_connected().await?;
        let template = require(opts.template, "Must Provide Model Template [template]")?;
        let kind = ModelKind::from_str(&template)
            .map_err(|_| EngineError::InputError(format!("Invalid Model Template [{template}]")))?;
        let label = require(opts.label, "Must Provide Label [label]")?;
        let image_uuid = require(opts.image_uuid, "Must Provide Image UUID [image_uuid]")?;
        self.check_image(kind, &image_uuid).await?;
        let metadata = apply_metadata(&model_fields(kind), &opts.req_metadata_hash)?;

        let mut model = ModelInstance::new(kind, label, image_uuid, metadata);
        self.data.persist(&mut model).await?;
        info!("Model '{}' created ({})", model.label, model.uuid);
        Ok(model)
    }

    pub async fn update_model(&self, uuid: &str, opts: ModelUpdate) -> Result<ModelInstance, EngineError> {
        let current = self.not_found::<ModelInstance>(uuid, "Model").await?;
        if opts.label.is_none() && opts.image_uuid.is_none() && opts.req_metadata_hash.is_none() {
            return Err(EngineError::MissingArgument(
                "Must provide one option from [label, image_uuid, req_metadata_hash]".to_string(),
            ));
        }
        if let Some(image_uuid) = opts.image_uuid.as_deref() {
            self.check_image(current.kind, image_uuid).await?;
        }
        let metadata = opts
            .req_metadata_hash
            .as_ref()
            .map(|req| apply_metadata(&model_fields(current.kind), req))
            .transpose()?;
        let (model, ()) = self
            .update::<ModelInstance, _, _>(uuid, |m| {
                if let Some(label) = &opts.label {
                    m.label.clone_from(label);
                }
                if let Some(image_uuid) = &opts.image_uuid {
                    m.image_uuid.clone_from(image_uuid);
                }
                if let Some(metadata) = &metadata {
                    m.metadata.clone_from(metadata);
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot Find Model with UUID: [{uuid}]")))?;
        Ok(model)
    }

    pub async fn get_model(&self, uuid: &str) -> Result<ModelInstance, EngineError> {
        self.not_found(uuid, "Model").await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInstance>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn remove_model(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<ModelInstance>(uuid, "Model").await
    }

    pub async fn remove_all_models(&self) -> Result<(), EngineError> {
        self.data.ensure_connected().await?;
        self.data.remove_all::<ModelInstance>().await?;
        Ok(())
    }

    // ---- brokers ----

    pub fn broker_plugins(&self) -> Vec<TemplateInfo> {
        BrokerPluginKind::ALL
            .into_iter()
            .map(|p| TemplateInfo {
                name: p.as_str(),
                description: p.description(),
            })
            .collect()
    }

    pub async fn add_broker(&self, opts: BrokerOptions) -> Result<Broker, EngineError> {
        self.data.ensure_connected().await?;
        let plugin_name = require(opts.plugin, "Must Provide Broker Plugin [plugin]")?;
        let plugin = BrokerPluginKind::from_str(&plugin_name)?;
        let name = require(opts.name, "Must Provide Name [name]")?;
        let req = opts.req_metadata_hash.ok_or_else(|| {
            EngineError::MissingArgument("Must Provide Required Metadata [req_metadata_hash]".to_string())
        })?;
        let metadata = apply_metadata(&broker_fields(plugin), &req)?;

        let mut broker = Broker::new(name, opts.description.unwrap_or_default(), plugin, metadata);
        self.data.persist(&mut broker).await?;
        info!("Broker '{}' created ({})", broker.name, broker.uuid);
        Ok(broker)
    }

    pub async fn update_broker(&self, uuid: &str, opts: BrokerUpdate) -> Result<Broker, EngineError> {
        let current = self.not_found::<Broker>(uuid, "Broker Target").await?;
        if opts.name.is_none() && opts.description.is_none() && opts.req_metadata_hash.is_none() {
            return Err(EngineError::MissingArgument(
                "Must provide one option from [name, description, req_metadata_hash]".to_string(),
            ));
        }
        let metadata = opts
            .req_metadata_hash
            .as_ref()
            .map(|req| apply_metadata(&broker_fields(current.plugin), req))
            .transpose()?;
        let (broker, ()) = self
            .update::<Broker, _, _>(uuid, |b| {
                if let Some(name) = &opts.name {
                    b.name.clone_from(name);
                }
                if let Some(description) = &opts.description {
                    b.user_description.clone_from(description);
                }
                if let Some(metadata) = &metadata {
                    b.metadata.clone_from(metadata);
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot Find Broker Target with UUID: [{uuid}]")))?;
        Ok(broker)
    }

    pub async fn get_broker(&self, uuid: &str) -> Result<Broker, EngineError> {
        self.not_found(uuid, "Broker").await
    }

    pub async fn list_brokers(&self) -> Result<Vec<Broker>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn remove_broker(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<Broker>(uuid, "Broker").await
    }

    pub async fn remove_all_brokers(&self) -> Result<(), EngineError> {
        self.data.ensure_connected().await?;
        self.data.remove_all::<Broker>().await?;
        Ok(())
    }

    // ---- tag rules and matchers ----

    pub async fn add_tag_rule(&self, opts: TagRuleOptions) -> Result<TagRule, EngineError> {
        self.data.ensure_connected().await?;
        let name = require(opts.name, "Must Provide Name [name]")?;
        let tag = require(opts.tag, "Must Provide Tag [tag]")?;
        let mut rule = TagRule::new(name, tag);
        self.data.persist(&mut rule).await?;
        info!("Tag rule '{}' created ({})", rule.name, rule.uuid);
        Ok(rule)
    }

    pub async fn update_tag_rule(&self, uuid: &str, opts: TagRuleOptions) -> Result<TagRule, EngineError> {
        self.not_found::<TagRule>(uuid, "Tag Rule").await?;
        if opts.name.is_none() && opts.tag.is_none() {
            return Err(EngineError::MissingArgument("Must provide one option from [name, tag]".to_string()));
        }
        let (rule, ()) = self
            .update::<TagRule, _, _>(uuid, |r| {
                if let Some(name) = &opts.name {
                    r.name.clone_from(name);
                }
                if let Some(tag) = &opts.tag {
                    r.tag.clone_from(tag);
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot Find Tag Rule with UUID: [{uuid}]")))?;
        Ok(rule)
    }

    pub async fn get_tag_rule(&self, uuid: &str) -> Result<TagRule, EngineError> {
        self.not_found(uuid, "Tag Rule").await
    }

    pub async fn list_tag_rules(&self) -> Result<Vec<TagRule>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn remove_tag_rule(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<TagRule>(uuid, "Tag Rule").await
    }

    pub async fn remove_all_tag_rules(&self) -> Result<(), EngineError> {
        self.data.ensure_connected().await?;
        self.data.remove_all::<TagRule>().await?;
        Ok(())
    }

    pub async fn add_matcher(&self, rule_uuid: &str, opts: MatcherOptions) -> Result<TagMatcher, EngineError> {
        self.not_found::<TagRule>(rule_uuid, "Tag Rule").await?;
        let key = require(opts.key, "Must Provide Key [key]")?;
        let compare = parse_compare(opts.compare.as_deref().unwrap_or_default())?;
        let value = require(opts.value, "Must Provide Value [value]")?;
        let inverse = parse_inverse(opts.inverse.as_ref())?;
        let (_, matcher) = self
            .update::<TagRule, _, _>(rule_uuid, |r| {
                Ok(r.add_matcher(key.as_str(), compare, value.as_str(), inverse).clone())
            })
            .await?
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot Find Tag Rule with UUID: [{rule_uuid}]")))?;
        Ok(matcher)
    }

    pub async fn update_matcher(
        &self,
        rule_uuid: &str,
        matcher_uuid: &str,
        opts: MatcherOptions,
    ) -> Result<TagMatcher, EngineError> {
        let compare = opts.compare.as_deref().map(parse_compare).transpose()?;
        let inverse = match opts.inverse.as_ref() {
            Some(v) => Some(parse_inverse(Some(v))?),
            None => None,
        };
        let missing = || EngineError::InvalidUuid(format!("Cannot find Tag Matcher with UUID [{matcher_uuid}]"));
        let (_, matcher) = self
            .update::<TagRule, _, _>(rule_uuid, |r| {
                let m = r
                    .tag_matchers
                    .iter_mut()
                    .find(|m| m.uuid == matcher_uuid)
                    .ok_or_else(missing)?;
                if let Some(key) = &opts.key {
                    m.key.clone_from(key);
                }
                if let Some(compare) = compare {
                    m.compare = compare;
                }
                if let Some(value) = &opts.value {
                    m.value.clone_from(value);
                }
                if let Some(inverse) = inverse {
                    m.inverse = inverse;
                }
                Ok(m.clone())
            })
            .await?
            .ok_or_else(missing)?;
        Ok(matcher)
    }

    pub async fn get_matcher(&self, rule_uuid: &str, matcher_uuid: &str) -> Result<TagMatcher, EngineError> {
        self.not_found::<TagRule>(rule_uuid, "Tag Rule")
            .await?
            .matcher(matcher_uuid)
            .cloned()
            .ok_or_else(|| EngineError::InvalidUuid(format!("Cannot find Tag Matcher with UUID [{matcher_uuid}]")))
    }

    /// Removes a matcher and returns the updated rule
    pub async fn remove_matcher(&self, rule_uuid: &str, matcher_uuid: &str) -> Result<TagRule, EngineError> {
        let missing = || EngineError::InvalidUuid(format!("Cannot find Tag Matcher with UUID [{matcher_uuid}]"));
        let (rule, ()) = self
            .update::<TagRule, _, _>(rule_uuid, |r| {
                if r.remove_matcher(matcher_uuid) { Ok(()) } else { Err(missing()) }
            })
            .await?
            .ok_or_else(missing)?;
        Ok(rule)
    }

    // ---- nodes ----

    async fn with_tags(&self, mut nodes: Vec<Node>) -> Result<Vec<Node>, EngineError> {
        let rules = self.data.fetch_all::<TagRule>().await?;
        for node in &mut nodes {
            node.tags = matched_tags(&rules, node);
        }
        Ok(nodes)
    }

    /// Nodes with their current tags
    pub async fn list_nodes(&self) -> Result<Vec<Node>, EngineError> {
        self.data.ensure_connected().await?;
        let nodes = self.data.fetch_all::<Node>().await?;
        self.with_tags(nodes).await
    }

    pub async fn get_node(&self, uuid: &str) -> Result<Node, EngineError> {
        let node = self.not_found::<Node>(uuid, "Node").await?;
        let mut tagged = self.with_tags(vec![node]).await?;
        tagged
            .pop()
            .ok_or_else(|| EngineError::Internal("node vanished while tagging".to_string()))
    }

    pub async fn remove_node(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<Node>(uuid, "Node").await
    }

    // ---- active models ----

    pub async fn list_active_models(&self) -> Result<Vec<ActiveModel>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn get_active_model(&self, uuid: &str) -> Result<ActiveModel, EngineError> {
        self.not_found(uuid, "Active Model").await
    }

    pub async fn active_model_log(&self, uuid: &str) -> Result<Vec<LogEntry>, EngineError> {
        Ok(self.get_active_model(uuid).await?.log)
    }

    /// Every active model's log, oldest first
    pub async fn logview(&self) -> Result<Vec<LogViewEntry>, EngineError> {
        let mut entries: Vec<LogViewEntry> = self
            .list_active_models()
            .await?
            .into_iter()
            .flat_map(|am| {
                let (uuid, node_uuid, label) = (am.uuid, am.node_uuid, am.label);
                am.log.into_iter().map(move |entry| LogViewEntry {
                    active_model_uuid: uuid.clone(),
                    node_uuid: node_uuid.clone(),
                    label: label.clone(),
                    entry,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.entry.timestamp);
        Ok(entries)
    }

    pub async fn remove_active_model(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<ActiveModel>(uuid, "Active Model").await
    }

    pub async fn remove_all_active_models(&self) -> Result<(), EngineError> {
        self.data.ensure_connected().await?;
        self.data.remove_all::<ActiveModel>().await?;
        info!("All active models removed");
        Ok(())
    }

    // ---- BMCs ----

    /// Registers a BMC or refreshes an existing one. The stored record is
    /// rewritten only when something it tracks changed.
    pub async fn register_bmc(&self, opts: BmcRegistration) -> Result<Bmc, EngineError> {
        self.data.ensure_connected().await?;
        let mac = require(opts.mac_address, "Must Provide MAC Address [mac_address]")?;
        let ip = require(opts.ip_address, "Must Provide IP Address [ip_address]")?;
        let mut candidate = Bmc::new(&mac, &ip)?;
        self.bmc.refresh(&mut candidate).await;

        match self.data.fetch::<Bmc>(&candidate.uuid).await? {
            Some(existing) if !candidate.differs_from(&existing) => Ok(existing),
            existing => {
                candidate.version = existing.map_or(0, |e| e.version);
                candidate.timestamp = now_timestamp();
                self.data.persist(&mut candidate).await?;
                info!("BMC {} registered ({} at {})", candidate.uuid, candidate.mac, candidate.ip);
                Ok(candidate)
            }
        }
    }

    pub async fn get_bmc(&self, uuid: &str) -> Result<Bmc, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch::<Bmc>(uuid).await?.ok_or_else(|| {
            EngineError::InvalidUuid(format!("no matching BMC (with a uuid value of '{uuid}') found"))
        })
    }

    pub async fn list_bmcs(&self) -> Result<Vec<Bmc>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn remove_bmc(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<Bmc>(uuid, "BMC").await
    }

    /// Runs an ipmitool query named by `sub_command action`
    pub async fn query_bmc(
        &self,
        uuid: &str,
        sub_command: &str,
        action: &str,
    ) -> Result<BTreeMap<String, String>, EngineError> {
        let query = IpmiQuery::from_subcommand(sub_command, action)?;
        let bmc = self.get_bmc(uuid).await?;
        self.bmc.query(&bmc, query).await.map_err(|e| {
            EngineError::CommandFailed(format!("ipmi query command '{}' failed: {}", query.as_str(), e.message()))
        })
    }

    pub async fn change_bmc_power_state(&self, uuid: &str, new_state: &str) -> Result<String, EngineError> {
        if new_state.trim().is_empty() {
            return Err(EngineError::InputError(
                "missing details for command to change power state".to_string(),
            ));
        }
        let bmc = self.get_bmc(uuid).await?;
        self.bmc.change_power_state(&bmc, new_state).await
    }

    // ---- images ----

    pub async fn add_image(&self, opts: ImageOptions) -> Result<ImageRecord, EngineError> {
        self.data.ensure_connected().await?;
        let kind_name = require(opts.kind, "Must Provide Image Type [type]")?;
        let kind = ImageKind::from_str(&kind_name)?;
        let name = require(opts.name, "Must Provide Name [name]")?;
        let version = require(opts.version, "Must Provide Version [version]")?;
        let kernel = require(opts.kernel, "Must Provide Kernel Path [kernel]")?;
        let initrd = require(opts.initrd, "Must Provide Initrd Path [initrd]")?;
        let mut image = ImageRecord::new(kind, name, version, kernel, initrd);
        image.description = opts.description.unwrap_or_default();
        self.data.persist(&mut image).await?;
        info!("Image '{}' {} added ({})", image.name, image.image_version, image.uuid);
        Ok(image)
    }

    pub async fn get_image(&self, uuid: &str) -> Result<ImageRecord, EngineError> {
        self.not_found(uuid, "Image").await
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>, EngineError> {
        self.data.ensure_connected().await?;
        self.data.fetch_all().await
    }

    pub async fn remove_image(&self, uuid: &str) -> Result<(), EngineError> {
        self.remove_one::<ImageRecord>(uuid, "Image").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximum_must_be_exact_non_negative_integer() {
        assert_eq!(parse_maximum(&OptionValue::Text("3".into())).unwrap(), 3);
        assert_eq!(parse_maximum(&OptionValue::Number(0)).unwrap(), 0);
        assert_eq!(
            parse_maximum(&OptionValue::Text("03".into())).unwrap_err().message(),
            "Policy maximum count must be a valid integer"
        );
        assert_eq!(
            parse_maximum(&OptionValue::Text("-1".into())).unwrap_err().message(),
            "Policy maximum count must be > 0"
        );
    }

    #[test]
    fn test_enabled_flag() {
        assert!(parse_enabled(&OptionValue::Flag(true)).unwrap());
        assert!(!parse_enabled(&OptionValue::Text("false".into())).unwrap());
        assert_eq!(parse_enabled(&OptionValue::Text("yes".into())).unwrap_err().kind(), "input_error");
    }

    #[test]
    fn test_tags_input() {
        let joined = TagsInput::Joined("web, db,,".into());
        assert_eq!(joined.tags(), vec!["web", "db"]);
        assert!(required_tags(None, "none").is_err());
    }
}
