//! Config variables that are either literals or references
//!
//! A [`ConfigVarString`] or [`ConfigVarBool`] carries a literal value, a
//! reference to a key in a Secret, a reference to a key in a ConfigMap, or a
//! combination of them. The wire format collapses to a bare scalar when no
//! reference is set:
//!
//! ```text
//! token: "abc"
//! token:
//!   secretKeyRef: {namespace: kube-system, name: cloud-credentials, key: token}
//! ```
//!
//! Resolution (literal > secret > config map > env fallback) lives in the
//! `machine-config` crate.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Reference to a key inside a namespaced Secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSecretKeySelector {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

impl GlobalSecretKeySelector {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }
}

/// Reference to a key inside a namespaced ConfigMap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfigMapKeySelector {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

impl GlobalConfigMapKeySelector {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }
}

/// String config field: literal and/or reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigVarString {
    pub value: String,
    pub secret_key_ref: Option<GlobalSecretKeySelector>,
    pub config_map_key_ref: Option<GlobalConfigMapKeySelector>,
}

impl ConfigVarString {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn from_secret(selector: GlobalSecretKeySelector) -> Self {
        Self {
            secret_key_ref: Some(selector),
            ..Default::default()
        }
    }

    pub fn from_config_map(selector: GlobalConfigMapKeySelector) -> Self {
        Self {
            config_map_key_ref: Some(selector),
            ..Default::default()
        }
    }

    pub fn has_reference(&self) -> bool {
        self.secret_key_ref.is_some() || self.config_map_key_ref.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && !self.has_reference()
    }
}

impl From<&str> for ConfigVarString {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

/// Boolean config field; `value: None` means "not set", distinct from `false`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigVarBool {
    pub value: Option<bool>,
    pub secret_key_ref: Option<GlobalSecretKeySelector>,
    pub config_map_key_ref: Option<GlobalConfigMapKeySelector>,
}

impl ConfigVarBool {
    pub fn literal(value: bool) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn has_reference(&self) -> bool {
        self.secret_key_ref.is_some() || self.config_map_key_ref.is_some()
    }
}

fn str_is_empty(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StringObjectOut<'a> {
    #[serde(skip_serializing_if = "str_is_empty")]
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key_ref: Option<&'a GlobalSecretKeySelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_map_key_ref: Option<&'a GlobalConfigMapKeySelector>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StringObjectIn {
    #[serde(default)]
    value: String,
    #[serde(default)]
    secret_key_ref: Option<GlobalSecretKeySelector>,
    #[serde(default)]
    config_map_key_ref: Option<GlobalConfigMapKeySelector>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringWire {
    Literal(String),
    Object(StringObjectIn),
}

impl Serialize for ConfigVarString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.has_reference() {
            return serializer.serialize_str(&self.value);
        }
        StringObjectOut {
            value: &self.value,
            secret_key_ref: self.secret_key_ref.as_ref(),
            config_map_key_ref: self.config_map_key_ref.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigVarString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<StringWire>::deserialize(deserializer)? {
            None => ConfigVarString::default(),
            Some(StringWire::Literal(value)) => ConfigVarString::literal(value),
            Some(StringWire::Object(obj)) => ConfigVarString {
                value: obj.value,
                secret_key_ref: obj.secret_key_ref,
                config_map_key_ref: obj.config_map_key_ref,
            },
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BoolObjectOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key_ref: Option<&'a GlobalSecretKeySelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_map_key_ref: Option<&'a GlobalConfigMapKeySelector>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoolObjectIn {
    #[serde(default)]
    value: Option<bool>,
    #[serde(default)]
    secret_key_ref: Option<GlobalSecretKeySelector>,
    #[serde(default)]
    config_map_key_ref: Option<GlobalConfigMapKeySelector>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolWire {
    Literal(bool),
    Object(BoolObjectIn),
}

impl Serialize for ConfigVarBool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.has_reference() {
            return match self.value {
                Some(value) => serializer.serialize_bool(value),
                None => serializer.serialize_none(),
            };
        }
        BoolObjectOut {
            value: self.value,
            secret_key_ref: self.secret_key_ref.as_ref(),
            config_map_key_ref: self.config_map_key_ref.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigVarBool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<BoolWire>::deserialize(deserializer)? {
            None => ConfigVarBool::default(),
            Some(BoolWire::Literal(value)) => ConfigVarBool::literal(value),
            Some(BoolWire::Object(obj)) => ConfigVarBool {
                value: obj.value,
                secret_key_ref: obj.secret_key_ref,
                config_map_key_ref: obj.config_map_key_ref,
            },
        })
    }
}
