//! Registered node types and the live keyed-instance index.

use std::{collections::HashMap, rc::Rc};

use super::{TypeDef, TypeError};
use crate::{node::NodeId, value::InstanceKey};

/// Forest-wide type table.
///
/// Keyed instances are indexed by `(tag, key)`. Entries are removed when
/// their node is collected, so a lookup only ever yields the current
/// instance for a key.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    types: HashMap<String, Rc<TypeDef>>,
    instances: HashMap<(String, InstanceKey), NodeId>,
    identities: HashMap<NodeId, (String, InstanceKey)>,
}

impl TypeRegistry {
    pub fn register(&mut self, def: Rc<TypeDef>) -> Result<(), TypeError> {
        if self.types.contains_key(&def.tag) {
            return Err(TypeError::DuplicateType {
                tag: def.tag.clone(),
            });
        }
        self.types.insert(def.tag.clone(), def);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<Rc<TypeDef>> {
        self.types.get(tag).cloned()
    }

    pub fn register_instance(&mut self, tag: String, key: InstanceKey, id: NodeId) {
        let identity = (tag, key);
        if let Some(previous) = self.instances.insert(identity.clone(), id) {
            self.identities.remove(&previous);
        }
        self.identities.insert(id, identity);
    }

    pub fn lookup_instance(&self, tag: &str, key: &InstanceKey) -> Option<NodeId> {
        self.instances.get(&(tag.to_string(), key.clone())).copied()
    }

    pub fn forget_instance(&mut self, id: NodeId) {
        if let Some(identity) = self.identities.remove(&id) {
            if self.instances.get(&identity) == Some(&id) {
                self.instances.remove(&identity);
            }
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
