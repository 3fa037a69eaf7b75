//! Forest-wide configuration.
//!
//! A [`ForestConfig`] is owned by each [`Forest`](crate::Forest) and can be
//! partially overridden at runtime with a [`ConfigOverride`], either built in
//! code or deserialized from JSON:
//!
//! ```
//! use canopy::{ConfigOverride, Forest};
//!
//! let forest = Forest::new();
//! let overrides = ConfigOverride::from_json(r#"{ "key_prefix": "t", "enforce_actions": true }"#).unwrap();
//! forest.configure(overrides);
//! assert!(forest.config().enforce_actions());
//! assert_eq!(forest.config().generate_key(), "0-t");
//! ```

use std::{cell::Cell, fmt, rc::Rc};

use serde::Deserialize;

use crate::{Result, constants::KEY_PREFIX_LEN};

/// Produces fresh uniqueness keys for keyed node types.
pub type KeyGenerator = Rc<dyn Fn() -> String>;

/// Sequential generator: `<base36 counter>-<prefix>`.
pub fn sequential_keys(prefix: impl Into<String>) -> KeyGenerator {
    let prefix = prefix.into();
    let counter = Cell::new(0u64);
    Rc::new(move || {
        let n = counter.get();
        counter.set(n + 1);
        format!("{}-{prefix}", to_base36(n))
    })
}

/// The default generator, prefixed with a random per-forest tag.
pub fn default_key_generator() -> KeyGenerator {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    sequential_keys(&tag[..KEY_PREFIX_LEN])
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Effective configuration of a forest.
#[derive(Clone)]
pub struct ForestConfig {
    key_generator: KeyGenerator,
    enforce_actions: bool,
}

impl ForestConfig {
    pub fn key_generator(&self) -> KeyGenerator {
        self.key_generator.clone()
    }

    pub fn generate_key(&self) -> String {
        (self.key_generator)()
    }

    /// When set, mutating a node outside an action fails with
    /// [`NodeError::OutsideAction`](crate::node::NodeError::OutsideAction).
    pub fn enforce_actions(&self) -> bool {
        self.enforce_actions
    }

    pub fn with_key_generator(mut self, generator: impl Fn() -> String + 'static) -> Self {
        self.key_generator = Rc::new(generator);
        self
    }

    pub fn with_enforce_actions(mut self, enforce: bool) -> Self {
        self.enforce_actions = enforce;
        self
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            key_generator: default_key_generator(),
            enforce_actions: false,
        }
    }
}

impl fmt::Debug for ForestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForestConfig")
            .field("enforce_actions", &self.enforce_actions)
            .finish_non_exhaustive()
    }
}

/// Partial configuration; unset fields keep their current value.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverride {
    /// Custom key generator. Takes precedence over `key_prefix`.
    #[serde(skip)]
    pub key_generator: Option<KeyGenerator>,
    /// Replaces the random prefix of the sequential key generator.
    pub key_prefix: Option<String>,
    pub enforce_actions: Option<bool>,
}

impl ConfigOverride {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn key_generator(mut self, generator: impl Fn() -> String + 'static) -> Self {
        self.key_generator = Some(Rc::new(generator));
        self
    }

    pub fn enforce_actions(mut self, enforce: bool) -> Self {
        self.enforce_actions = Some(enforce);
        self
    }

    pub(crate) fn apply_to(self, config: &mut ForestConfig) {
        if let Some(generator) = self.key_generator {
            config.key_generator = generator;
        } else if let Some(prefix) = self.key_prefix {
            config.key_generator = sequential_keys(prefix);
        }
        if let Some(enforce) = self.enforce_actions {
            config.enforce_actions = enforce;
        }
    }
}

impl fmt::Debug for ConfigOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverride")
            .field("key_generator", &self.key_generator.is_some())
            .field("key_prefix", &self.key_prefix)
            .field("enforce_actions", &self.enforce_actions)
            .finish()
    }
}
