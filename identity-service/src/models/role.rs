//! Roles and the closed permission vocabulary.
//!
//! Permission maps are stored serialized (JSON) and parsed into the typed
//! shapes here at the store boundary only; the evaluator never sees an
//! untyped map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use service_core::error::AppError;

/// Resource classes assets fall into. `confidential` actions are a distinct
/// namespace from `image`/`document` even though the verbs read the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Image,
    Document,
    Confidential,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::Image,
        ResourceClass::Document,
        ResourceClass::Confidential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Image => "image",
            ResourceClass::Document => "document",
            ResourceClass::Confidential => "confidential",
        }
    }

    /// Short form used inside permission tokens (`view_conf`, `create_doc`).
    fn token_suffix(&self) -> &'static str {
        match self {
            ResourceClass::Image => "image",
            ResourceClass::Document => "doc",
            ResourceClass::Confidential => "conf",
        }
    }

    fn from_token_suffix(s: &str) -> Option<Self> {
        match s {
            "image" => Some(ResourceClass::Image),
            "doc" => Some(ResourceClass::Document),
            "conf" => Some(ResourceClass::Confidential),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceClass::Image),
            "document" => Ok(ResourceClass::Document),
            "confidential" => Ok(ResourceClass::Confidential),
            other => Err(AppError::Validation(format!(
                "unknown resource class: {other}"
            ))),
        }
    }
}

/// The closed action vocabulary. Every resource class supports exactly
/// these verbs; anything else in a stored map is corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetAction {
    Create,
    View,
    Update,
    Delete,
}

impl AssetAction {
    pub const ALL: [AssetAction; 4] = [
        AssetAction::Create,
        AssetAction::View,
        AssetAction::Update,
        AssetAction::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetAction::Create => "create",
            AssetAction::View => "view",
            AssetAction::Update => "update",
            AssetAction::Delete => "delete",
        }
    }
}

impl FromStr for AssetAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AssetAction::Create),
            "view" => Ok(AssetAction::View),
            "update" => Ok(AssetAction::Update),
            "delete" => Ok(AssetAction::Delete),
            other => Err(AppError::Validation(format!("unknown action: {other}"))),
        }
    }
}

/// One grant: an action on a resource class. Serialized as the namespaced
/// string form (`create_image`, `view_conf`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionToken {
    pub action: AssetAction,
    pub resource: ResourceClass,
}

impl PermissionToken {
    pub fn new(action: AssetAction, resource: ResourceClass) -> Self {
        Self { action, resource }
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action.as_str(), self.resource.token_suffix())
    }
}

impl FromStr for PermissionToken {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s.split_once('_').and_then(|(action, suffix)| {
            let action = action.parse::<AssetAction>().ok()?;
            let resource = ResourceClass::from_token_suffix(suffix)?;
            Some(PermissionToken { action, resource })
        });
        parsed.ok_or_else(|| AppError::Validation(format!("unknown permission token: {s}")))
    }
}

/// Grants for one role, keyed by resource class. Construction goes through
/// [`PermissionSet::from_wire`] or [`PermissionSet::grant`], both of which
/// only admit vocabulary members, so a set is valid by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    grants: BTreeMap<ResourceClass, BTreeSet<AssetAction>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action on every class.
    pub fn full() -> Self {
        let mut set = Self::new();
        for resource in ResourceClass::ALL {
            for action in AssetAction::ALL {
                set.grant(PermissionToken::new(action, resource));
            }
        }
        set
    }

    pub fn grant(&mut self, token: PermissionToken) {
        self.grants.entry(token.resource).or_default().insert(token.action);
    }

    pub fn contains(&self, token: &PermissionToken) -> bool {
        self.grants
            .get(&token.resource)
            .is_some_and(|actions| actions.contains(&token.action))
    }

    pub fn is_empty(&self) -> bool {
        self.grants.values().all(|actions| actions.is_empty())
    }

    /// Parse the serialized wire shape,
    /// `{"image": ["create_image", ...], "confidential": [...]}`.
    /// Unknown resource keys, unknown tokens, and tokens filed under a class
    /// they do not belong to are all rejected; this runs before anything is
    /// persisted, not at evaluation time.
    pub fn from_wire(raw: &str) -> Result<Self, AppError> {
        let parsed: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("malformed permission map: {e}")))?;

        let mut set = PermissionSet::new();
        for (key, tokens) in parsed {
            let class: ResourceClass = key.parse()?;
            for raw_token in tokens {
                let token: PermissionToken = raw_token.parse()?;
                if token.resource != class {
                    return Err(AppError::Validation(format!(
                        "permission {raw_token} does not belong under {key}"
                    )));
                }
                set.grant(token);
            }
        }
        Ok(set)
    }

    /// Serialized wire shape with deterministic (sorted) ordering.
    pub fn to_wire(&self) -> Result<String, AppError> {
        let out: BTreeMap<&str, Vec<String>> = self
            .grants
            .iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(resource, actions)| {
                let tokens = actions
                    .iter()
                    .map(|action| PermissionToken::new(*action, *resource).to_string())
                    .collect();
                (resource.as_str(), tokens)
            })
            .collect();
        serde_json::to_string(&out)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize permissions: {e}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = PermissionToken> + '_ {
        self.grants.iter().flat_map(|(resource, actions)| {
            actions
                .iter()
                .map(move |action| PermissionToken::new(*action, *resource))
        })
    }
}

/// Role record. The permission map itself lives behind
/// `CredentialStore::read_permissions`/`write_permissions` in serialized
/// form; it is parsed at that boundary, not carried here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(role_name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            role_name: role_name.into(),
            description,
            created_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_string_forms_round_trip() {
        for resource in ResourceClass::ALL {
            for action in AssetAction::ALL {
                let token = PermissionToken::new(action, resource);
                let parsed: PermissionToken = token.to_string().parse().unwrap();
                assert_eq!(parsed, token);
            }
        }
    }

    #[test]
    fn confidential_tokens_are_their_own_namespace() {
        let view_conf: PermissionToken = "view_conf".parse().unwrap();
        let view_doc: PermissionToken = "view_doc".parse().unwrap();
        assert_ne!(view_conf, view_doc);

        let mut set = PermissionSet::new();
        set.grant(view_doc);
        assert!(!set.contains(&view_conf));
    }

    #[test]
    fn from_wire_accepts_the_stored_shape() {
        let set = PermissionSet::from_wire(
            r#"{"image":["create_image","view_image"],"confidential":["view_conf"]}"#,
        )
        .unwrap();
        assert!(set.contains(&"view_conf".parse().unwrap()));
        assert!(set.contains(&"create_image".parse().unwrap()));
        assert!(!set.contains(&"delete_image".parse().unwrap()));
    }

    #[test]
    fn from_wire_rejects_unknown_resource_key() {
        assert!(PermissionSet::from_wire(r#"{"video":["view_image"]}"#).is_err());
    }

    #[test]
    fn from_wire_rejects_unknown_token() {
        assert!(PermissionSet::from_wire(r#"{"image":["publish_image"]}"#).is_err());
        assert!(PermissionSet::from_wire(r#"{"image":["view_movie"]}"#).is_err());
    }

    #[test]
    fn from_wire_rejects_token_filed_under_wrong_class() {
        assert!(PermissionSet::from_wire(r#"{"image":["view_conf"]}"#).is_err());
    }

    #[test]
    fn from_wire_rejects_malformed_json() {
        assert!(PermissionSet::from_wire("not json").is_err());
        assert!(PermissionSet::from_wire(r#"["view_conf"]"#).is_err());
    }

    #[test]
    fn to_wire_is_deterministic_and_sorted() {
        let mut a = PermissionSet::new();
        a.grant("view_conf".parse().unwrap());
        a.grant("create_image".parse().unwrap());
        a.grant("view_image".parse().unwrap());

        let mut b = PermissionSet::new();
        b.grant("view_image".parse().unwrap());
        b.grant("create_image".parse().unwrap());
        b.grant("view_conf".parse().unwrap());

        let wire_a = a.to_wire().unwrap();
        assert_eq!(wire_a, b.to_wire().unwrap());
        assert_eq!(
            wire_a,
            r#"{"confidential":["view_conf"],"image":["create_image","view_image"]}"#
        );
    }

    #[test]
    fn wire_round_trip_preserves_the_set() {
        let original = PermissionSet::full();
        let round_tripped = PermissionSet::from_wire(&original.to_wire().unwrap()).unwrap();
        assert_eq!(original, round_tripped);
    }
}
