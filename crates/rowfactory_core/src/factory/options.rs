//! Factory option declaration and validation.
//!
//! # Responsibility
//! - Hold the persistence options a SQL factory runs with.
//! - Validate every option when it is declared, not when it is used.
//!
//! # Invariants
//! - `FactoryOptions` only exists in validated form.
//! - `get_or_create` keeps declaration order and holds no duplicates.
//! - Child options start from their parent's values.

use crate::factory::ConfigError;
use crate::model::record::is_valid_identifier;
use crate::session::SessionHandle;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Durability step applied after every create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPersistence {
    /// Leave the instance added but unflushed.
    #[default]
    None,
    Flush,
    Commit,
}

impl SessionPersistence {
    pub const NAMES: [&'static str; 3] = ["none", "flush", "commit"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Flush => "flush",
            Self::Commit => "commit",
        }
    }
}

impl Display for SessionPersistence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionPersistence {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "flush" => Ok(Self::Flush),
            "commit" => Ok(Self::Commit),
            _ => Err(value.to_string()),
        }
    }
}

/// Validated options of one SQL factory.
pub struct FactoryOptions<S> {
    name: String,
    get_or_create: Vec<String>,
    session: Option<SessionHandle<S>>,
    session_persistence: SessionPersistence,
    inline_args: Vec<String>,
}

impl<S> FactoryOptions<S> {
    pub fn builder(name: impl Into<String>) -> FactoryOptionsBuilder<S> {
        FactoryOptionsBuilder::new(name)
    }

    /// Starts a child declaration that inherits every option of `self`.
    pub fn inherit(&self, name: impl Into<String>) -> FactoryOptionsBuilder<S> {
        FactoryOptionsBuilder {
            name: name.into(),
            get_or_create: self.get_or_create.clone(),
            session: self.session.clone(),
            session_persistence: PersistenceSetting::Parsed(self.session_persistence),
            inline_args: self.inline_args.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_or_create(&self) -> &[String] {
        &self.get_or_create
    }

    pub fn session(&self) -> Option<&SessionHandle<S>> {
        self.session.as_ref()
    }

    pub fn session_persistence(&self) -> SessionPersistence {
        self.session_persistence
    }

    pub fn inline_args(&self) -> &[String] {
        &self.inline_args
    }
}

impl<S> Clone for FactoryOptions<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            get_or_create: self.get_or_create.clone(),
            session: self.session.clone(),
            session_persistence: self.session_persistence,
            inline_args: self.inline_args.clone(),
        }
    }
}

impl<S> std::fmt::Debug for FactoryOptions<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryOptions")
            .field("name", &self.name)
            .field("get_or_create", &self.get_or_create)
            .field("has_session", &self.session.is_some())
            .field("session_persistence", &self.session_persistence)
            .field("inline_args", &self.inline_args)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum PersistenceSetting {
    Parsed(SessionPersistence),
    Raw(String),
}

/// Declares `FactoryOptions`; all checks run in [`FactoryOptionsBuilder::build`].
pub struct FactoryOptionsBuilder<S> {
    name: String,
    get_or_create: Vec<String>,
    session: Option<SessionHandle<S>>,
    session_persistence: PersistenceSetting,
    inline_args: Vec<String>,
}

impl<S> FactoryOptionsBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            get_or_create: Vec::new(),
            session: None,
            session_persistence: PersistenceSetting::Parsed(SessionPersistence::None),
            inline_args: Vec::new(),
        }
    }

    /// Replaces the lookup-key fields.
    pub fn get_or_create<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.get_or_create = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn session(mut self, session: SessionHandle<S>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn without_session(mut self) -> Self {
        self.session = None;
        self
    }

    pub fn session_persistence(mut self, persistence: SessionPersistence) -> Self {
        self.session_persistence = PersistenceSetting::Parsed(persistence);
        self
    }

    /// Sets the persistence policy from its textual name.
    pub fn session_persistence_name(mut self, name: impl Into<String>) -> Self {
        self.session_persistence = PersistenceSetting::Raw(name.into());
        self
    }

    /// Fields moved out of keyword arguments into positional arguments.
    pub fn inline_args<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.inline_args = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Applies declarative meta on top of the current declaration.
    pub fn apply_meta(mut self, meta: FactoryMeta) -> Self {
        if let Some(name) = meta.name {
            self.name = name;
        }
        if let Some(fields) = meta.get_or_create {
            self.get_or_create = fields;
        }
        if let Some(persistence) = meta.session_persistence {
            self.session_persistence = match persistence {
                Some(name) => PersistenceSetting::Raw(name),
                None => PersistenceSetting::Parsed(SessionPersistence::None),
            };
        }
        if let Some(fields) = meta.inline_args {
            self.inline_args = fields;
        }
        self
    }

    pub fn build(self) -> Result<FactoryOptions<S>, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let session_persistence = match self.session_persistence {
            PersistenceSetting::Parsed(value) => value,
            PersistenceSetting::Raw(raw) => raw.parse::<SessionPersistence>().map_err(|value| {
                ConfigError::InvalidSessionPersistence {
                    factory: name.clone(),
                    value,
                }
            })?,
        };

        let get_or_create = checked_fields(&name, self.get_or_create)?;
        let inline_args = checked_fields(&name, self.inline_args)?;

        Ok(FactoryOptions {
            name,
            get_or_create,
            session: self.session,
            session_persistence,
            inline_args,
        })
    }
}

fn checked_fields(factory: &str, fields: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut checked: Vec<String> = Vec::with_capacity(fields.len());
    for field in fields {
        let field = field.trim().to_string();
        if !is_valid_identifier(&field) {
            return Err(ConfigError::InvalidFieldName {
                factory: factory.to_string(),
                field,
            });
        }
        if !checked.contains(&field) {
            checked.push(field);
        }
    }
    Ok(checked)
}

/// Declarative factory options, usually read from JSON.
///
/// Absent keys leave the builder untouched; `"session_persistence": null`
/// selects `none`. Unset fields are omitted when serializing, so a meta
/// reads back exactly as it was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_or_create: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub session_persistence: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_args: Option<Vec<String>>,
}

impl FactoryMeta {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Keeps "key absent" and "key is null" apart for `Option<Option<T>>`.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::{FactoryMeta, FactoryOptions, SessionPersistence};
    use crate::factory::ConfigError;

    type Options = FactoryOptions<()>;

    #[test]
    fn defaults_are_plain_insert_without_persistence() {
        let options = Options::builder("UserFactory").build().unwrap();
        assert!(options.get_or_create().is_empty());
        assert!(options.session().is_none());
        assert_eq!(options.session_persistence(), SessionPersistence::None);
    }

    #[test]
    fn invalid_persistence_name_fails_at_declaration() {
        let err = Options::builder("UserFactory")
            .session_persistence_name("sometimes")
            .build()
            .expect_err("unknown persistence must be rejected");
        assert!(matches!(
            &err,
            ConfigError::InvalidSessionPersistence { factory, value }
                if factory == "UserFactory" && value == "sometimes"
        ));
        assert!(err.to_string().contains("none|flush|commit"));
    }

    #[test]
    fn persistence_names_are_case_insensitive() {
        let options = Options::builder("UserFactory")
            .session_persistence_name(" Commit ")
            .build()
            .unwrap();
        assert_eq!(options.session_persistence(), SessionPersistence::Commit);
    }

    #[test]
    fn get_or_create_dedupes_and_validates_fields() {
        let options = Options::builder("UserFactory")
            .get_or_create(["email", "tenant", "email"])
            .build()
            .unwrap();
        assert_eq!(options.get_or_create(), ["email", "tenant"]);

        let err = Options::builder("UserFactory")
            .get_or_create(["email OR 1=1"])
            .build()
            .expect_err("non-identifier must be rejected");
        assert!(matches!(err, ConfigError::InvalidFieldName { .. }));
    }

    #[test]
    fn child_inherits_and_overrides() {
        let parent = Options::builder("UserFactory")
            .get_or_create(["email"])
            .session_persistence(SessionPersistence::Flush)
            .build()
            .unwrap();

        let child = parent
            .inherit("AdminFactory")
            .session_persistence(SessionPersistence::Commit)
            .build()
            .unwrap();
        assert_eq!(child.name(), "AdminFactory");
        assert_eq!(child.get_or_create(), ["email"]);
        assert_eq!(child.session_persistence(), SessionPersistence::Commit);

        let err = parent
            .inherit("BrokenFactory")
            .session_persistence_name("always")
            .build()
            .expect_err("child declaration is validated too");
        assert!(matches!(err, ConfigError::InvalidSessionPersistence { .. }));
    }

    #[test]
    fn meta_json_distinguishes_null_from_absent() {
        let meta = FactoryMeta::from_json(
            r#"{"get_or_create": ["email"], "session_persistence": null}"#,
        )
        .unwrap();
        assert_eq!(meta.session_persistence, Some(None));

        let options = Options::builder("UserFactory")
            .session_persistence(SessionPersistence::Commit)
            .apply_meta(meta)
            .build()
            .unwrap();
        assert_eq!(options.session_persistence(), SessionPersistence::None);
        assert_eq!(options.get_or_create(), ["email"]);

        let meta = FactoryMeta::from_json(r#"{"session_persistence": "flush"}"#).unwrap();
        let options = Options::builder("UserFactory")
            .apply_meta(meta)
            .build()
            .unwrap();
        assert_eq!(options.session_persistence(), SessionPersistence::Flush);
    }

    #[test]
    fn meta_survives_a_json_round_trip() {
        let json = serde_json::to_string(&FactoryMeta::default()).unwrap();
        assert_eq!(json, "{}");
        let meta = FactoryMeta::from_json(&json).unwrap();
        assert_eq!(meta, FactoryMeta::default());

        let parent = Options::builder("UserFactory")
            .session_persistence(SessionPersistence::Commit)
            .build()
            .unwrap();
        let child = parent
            .inherit("AdminFactory")
            .apply_meta(meta)
            .build()
            .unwrap();
        assert_eq!(child.session_persistence(), SessionPersistence::Commit);

        let explicit_none = FactoryMeta {
            session_persistence: Some(None),
            ..FactoryMeta::default()
        };
        let json = serde_json::to_string(&explicit_none).unwrap();
        assert_eq!(json, r#"{"session_persistence":null}"#);
        assert_eq!(FactoryMeta::from_json(&json).unwrap(), explicit_none);

        let named = FactoryMeta {
            name: Some("SeedFactory".to_string()),
            get_or_create: Some(vec!["email".to_string()]),
            session_persistence: Some(Some("flush".to_string())),
            inline_args: None,
        };
        let json = serde_json::to_string(&named).unwrap();
        assert_eq!(FactoryMeta::from_json(&json).unwrap(), named);
    }

    #[test]
    fn meta_rejects_unknown_keys_and_bad_persistence() {
        let err = FactoryMeta::from_json(r#"{"sesion": "x"}"#).expect_err("typo key");
        assert!(matches!(err, ConfigError::Parse(_)));

        let meta = FactoryMeta::from_json(r#"{"session_persistence": "later"}"#).unwrap();
        let err = Options::builder("UserFactory")
            .apply_meta(meta)
            .build()
            .expect_err("bad persistence in meta");
        assert!(matches!(err, ConfigError::InvalidSessionPersistence { .. }));
    }
}
