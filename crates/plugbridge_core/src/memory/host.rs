// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory host node.

use crate::error::HostError;
use crate::host::{
    split_path, AttributeInfo, AttributeSpec, AttributeType, DataKind, HostCapabilities, HostNode,
    NumericKind,
};
use crate::numeric::Scalar;
use crate::port_index::RESERVED_ATTRIBUTES;
use crate::value::HostValue;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct Slot {
    info: AttributeInfo,
    /// Stored on top-level attributes only; children live inside it
    value: HostValue,
}

/// Host node backed by plain maps
///
/// Top-level attributes hold the whole value; compound children and array
/// elements are addressed inside it by path.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    name: String,
    slots: IndexMap<String, Slot>,
    dirty: HashSet<String>,
    connections: HashMap<String, Vec<String>>,
    capabilities: HostCapabilities,
    time: f64,
    scene_path: String,
}

impl MemoryHost {
    /// Create a node with the infrastructure attributes every bound node carries
    pub fn new(name: impl Into<String>) -> Self {
        let mut host = Self {
            name: name.into(),
            slots: IndexMap::new(),
            dirty: HashSet::new(),
            connections: HashMap::new(),
            capabilities: HostCapabilities::default(),
            time: 0.0,
            scene_path: String::new(),
        };
        for name in RESERVED_ATTRIBUTES {
            let ty = match name {
                "saveData" | "refFilePath" => AttributeType::String,
                "evalID" => AttributeType::Numeric(NumericKind::Int),
                _ => AttributeType::Numeric(NumericKind::Boolean),
            };
            host.insert(AttributeSpec::new(name, ty).hidden(), None, false);
        }
        host
    }

    /// Override host capabilities
    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the evaluation time
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Set the scene path
    pub fn set_scene_path(&mut self, path: impl Into<String>) {
        self.scene_path = path.into();
    }

    /// Connect an upstream plug (`node.attr`) into `attribute`
    pub fn connect(&mut self, plug: impl Into<String>, attribute: &str) {
        self.connections
            .entry(attribute.to_string())
            .or_default()
            .push(plug.into());
    }

    /// Whether an attribute was written since it was last set clean
    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Top-level attribute names in declaration order
    pub fn top_level(&self) -> Vec<String> {
        self.slots
            .values()
            .filter(|s| s.info.is_top_level())
            .map(|s| s.info.name.clone())
            .collect()
    }

    fn insert(&mut self, spec: AttributeSpec, parent: Option<&str>, dynamic: bool) {
        let value = default_value(&spec);
        let info = AttributeInfo {
            name: spec.name.clone(),
            ty: spec.ty,
            array: spec.array,
            parent: parent.map(str::to_string),
            children: spec.children.iter().map(|c| c.name.clone()).collect(),
            readable: spec.readable,
            writable: spec.writable,
            hidden: spec.hidden,
            dynamic,
        };
        self.slots.insert(spec.name.clone(), Slot { info, value });
        for child in spec.children {
            self.insert(child, Some(&spec.name), dynamic);
        }
    }

    /// Child positions from the top-level owner down to `name`
    fn chain(&self, name: &str) -> Result<(String, Vec<usize>), HostError> {
        let mut path = Vec::new();
        let mut current = name.to_string();
        loop {
            let slot = self
                .slots
                .get(&current)
                .ok_or_else(|| HostError::AttributeNotFound(name.to_string()))?;
            let Some(parent) = slot.info.parent.clone() else {
                break;
            };
            let parent_slot = self
                .slots
                .get(&parent)
                .ok_or_else(|| HostError::AttributeNotFound(parent.clone()))?;
            let position = parent_slot
                .info
                .children
                .iter()
                .position(|c| *c == current)
                .ok_or_else(|| HostError::AttributeNotFound(current.clone()))?;
            path.push(position);
            current = parent;
        }
        path.reverse();
        Ok((current, path))
    }

    /// Top-level owner, element index and child positions of a path
    fn locate(&self, path: &str) -> Result<(String, Option<usize>, Vec<usize>), HostError> {
        let (name, index, rest) = split_path(path);
        let (top, mut positions) = self.chain(name)?;
        if let Some(child) = rest {
            let (owner, child_positions) = self.chain(child)?;
            if owner != top {
                return Err(HostError::AttributeNotFound(path.to_string()));
            }
            positions = child_positions;
        }
        Ok((top, index, positions))
    }
}

fn default_value(spec: &AttributeSpec) -> HostValue {
    if spec.array {
        return HostValue::Multi(Vec::new());
    }
    match spec.ty {
        AttributeType::Numeric(kind) => numeric_zero(kind),
        AttributeType::Numeric3(NumericKind::Float) => HostValue::Float3([0.0; 3]),
        AttributeType::Numeric3(_) => HostValue::Double3([0.0; 3]),
        AttributeType::Unit(_) => HostValue::Double(0.0),
        AttributeType::String => HostValue::String(String::new()),
        AttributeType::Matrix => {
            let mut m = [0.0; 16];
            for i in 0..4 {
                m[i * 5] = 1.0;
            }
            HostValue::Matrix(m)
        }
        AttributeType::Data(kind) => match kind {
            DataKind::IntArray => HostValue::IntArray(Vec::new()),
            DataKind::FloatArray => HostValue::FloatArray(Vec::new()),
            DataKind::DoubleArray => HostValue::DoubleArray(Vec::new()),
            DataKind::VectorArray => HostValue::VectorArray(Vec::new()),
            DataKind::PointArray => HostValue::PointArray(Vec::new()),
            DataKind::StringArray => HostValue::StringArray(Vec::new()),
            DataKind::Mesh | DataKind::Curve => HostValue::Empty,
        },
        AttributeType::Compound => {
            HostValue::Compound(spec.children.iter().map(default_value).collect())
        }
        AttributeType::Opaque | AttributeType::Message => HostValue::Empty,
    }
}

fn numeric_zero(kind: NumericKind) -> HostValue {
    match kind {
        NumericKind::Boolean => HostValue::Bool(false),
        NumericKind::Byte => HostValue::Byte(0),
        NumericKind::Short => HostValue::Short(0),
        NumericKind::Int => HostValue::Int(0),
        NumericKind::Int64 => HostValue::Int64(0),
        NumericKind::Float => HostValue::Float(0.0),
        NumericKind::Double => HostValue::Double(0.0),
    }
}

/// Store `value` over `slot`, keeping numeric storage kinds and merging compounds
fn assign(slot: &mut HostValue, value: HostValue) -> Result<(), HostError> {
    if matches!(value, HostValue::Empty) && !matches!(slot, HostValue::Empty | HostValue::Opaque(_)) {
        return Ok(());
    }
    match (slot, value) {
        (HostValue::Compound(children), HostValue::Compound(values)) => {
            for (child, value) in children.iter_mut().zip(values) {
                assign(child, value)?;
            }
            Ok(())
        }
        (current, value) => {
            if let (Some(existing), Some(incoming)) = (current.as_scalar(), value.as_scalar()) {
                *current = scalar_like(existing, incoming);
                return Ok(());
            }
            let compatible = matches!(current, HostValue::Empty | HostValue::Opaque(_))
                || matches!(value, HostValue::Opaque(_))
                || std::mem::discriminant(&*current) == std::mem::discriminant(&value)
                || matches!(
                    (&*current, &value),
                    (
                        HostValue::Float3(_) | HostValue::Double3(_),
                        HostValue::Float3(_) | HostValue::Double3(_)
                    )
                );
            if !compatible {
                return Err(HostError::TypeMismatch(format!(
                    "cannot store {} into {}",
                    value.describe(),
                    current.describe()
                )));
            }
            *current = value;
            Ok(())
        }
    }
}

/// `incoming` converted to the storage kind of `existing`
fn scalar_like(existing: Scalar, incoming: Scalar) -> HostValue {
    match existing {
        Scalar::Boolean(_) => HostValue::Bool(incoming.as_bool()),
        Scalar::UInt8(_) => HostValue::Byte(incoming.as_i64() as u8),
        Scalar::SInt16(_) => HostValue::Short(incoming.as_i64() as i16),
        Scalar::SInt32(_) => HostValue::Int(incoming.as_i64() as i32),
        Scalar::Float32(_) => HostValue::Float(incoming.as_f64() as f32),
        Scalar::Float64(_) => HostValue::Double(incoming.as_f64()),
        _ => HostValue::Int64(incoming.as_i64()),
    }
}

fn descend<'v>(value: &'v HostValue, positions: &[usize]) -> Option<&'v HostValue> {
    positions.iter().try_fold(value, |current, &i| match current {
        HostValue::Compound(children) => children.get(i),
        _ => None,
    })
}

fn descend_mut<'v>(value: &'v mut HostValue, positions: &[usize]) -> Option<&'v mut HostValue> {
    positions.iter().try_fold(value, |current, &i| match current {
        HostValue::Compound(children) => children.get_mut(i),
        _ => None,
    })
}

impl HostNode for MemoryHost {
    fn node_name(&self) -> String {
        self.name.clone()
    }

    fn attributes(&self) -> Vec<AttributeInfo> {
        self.slots.values().map(|s| s.info.clone()).collect()
    }

    fn attribute(&self, name: &str) -> Option<AttributeInfo> {
        self.slots.get(name).map(|s| s.info.clone())
    }

    fn value(&self, path: &str) -> Result<HostValue, HostError> {
        let (top, index, positions) = self.locate(path)?;
        let slot = &self.slots[&top];
        let not_found = || HostError::AttributeNotFound(path.to_string());
        let root = match (index, &slot.value) {
            (Some(i), HostValue::Multi(items)) => match items.get(i) {
                Some(item) => item,
                None => return Ok(HostValue::Empty),
            },
            (Some(_), _) => return Err(not_found()),
            (None, value) => value,
        };
        if index.is_none() && slot.info.array && !positions.is_empty() {
            // child of a multi compound without an element index
            return Err(not_found());
        }
        descend(root, &positions).cloned().ok_or_else(not_found)
    }

    fn set_value(&mut self, path: &str, value: HostValue) -> Result<(), HostError> {
        let (top, index, positions) = self.locate(path)?;
        let path_owned = path.to_string();
        let not_found = || HostError::AttributeNotFound(path_owned.clone());
        let template = self
            .slots
            .get(&top)
            .map(|s| {
                default_value(&AttributeSpec {
                    array: false,
                    ..spec_of(self, &s.info)
                })
            })
            .unwrap_or_default();
        let slot = self.slots.get_mut(&top).ok_or_else(not_found)?;
        let root = match index {
            Some(i) => match &mut slot.value {
                HostValue::Multi(items) => {
                    if items.len() <= i {
                        items.resize(i + 1, template);
                    }
                    &mut items[i]
                }
                _ => return Err(not_found()),
            },
            None if slot.info.array && !positions.is_empty() => return Err(not_found()),
            None => &mut slot.value,
        };
        let target = descend_mut(root, &positions).ok_or_else(not_found)?;
        if slot.info.array && index.is_none() {
            // whole-array writes replace the element list
            if !matches!(value, HostValue::Multi(_) | HostValue::Empty) {
                return Err(HostError::TypeMismatch(format!(
                    "{path} is an array, got {}",
                    value.describe()
                )));
            }
            if let HostValue::Multi(_) = value {
                *target = value;
            }
        } else {
            assign(target, value)?;
        }
        self.dirty.insert(top);
        Ok(())
    }

    fn add_attribute(&mut self, spec: AttributeSpec) -> Result<(), HostError> {
        if self.slots.contains_key(&spec.name) {
            return Err(HostError::AttributeExists {
                node: self.name.clone(),
                attribute: spec.name,
            });
        }
        self.insert(spec, None, true);
        Ok(())
    }

    fn remove_attribute(&mut self, name: &str) -> Result<(), HostError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| HostError::AttributeNotFound(name.to_string()))?;
        if !slot.info.dynamic {
            return Err(HostError::Rejected(format!("{name} is a static attribute")));
        }
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(removed) = self.slots.shift_remove(&current) {
                pending.extend(removed.info.children);
            }
            self.dirty.remove(&current);
            self.connections.remove(&current);
        }
        Ok(())
    }

    fn rename_attribute(&mut self, old: &str, new: &str) -> Result<(), HostError> {
        if self.slots.contains_key(new) {
            return Err(HostError::AttributeExists {
                node: self.name.clone(),
                attribute: new.to_string(),
            });
        }
        let position = self
            .slots
            .get_index_of(old)
            .ok_or_else(|| HostError::AttributeNotFound(old.to_string()))?;
        let (_, mut slot) = self
            .slots
            .shift_remove_index(position)
            .ok_or_else(|| HostError::AttributeNotFound(old.to_string()))?;
        slot.info.name = new.to_string();
        let children = slot.info.children.clone();
        let parent = slot.info.parent.clone();
        self.slots.shift_insert(position, new.to_string(), slot);
        for child in children {
            if let Some(child_slot) = self.slots.get_mut(&child) {
                child_slot.info.parent = Some(new.to_string());
            }
        }
        if let Some(parent_slot) = parent.and_then(|p| self.slots.get_mut(&p)) {
            for child in parent_slot.info.children.iter_mut().filter(|c| *c == old) {
                *child = new.to_string();
            }
        }
        if self.dirty.remove(old) {
            self.dirty.insert(new.to_string());
        }
        if let Some(plugs) = self.connections.remove(old) {
            self.connections.insert(new.to_string(), plugs);
        }
        Ok(())
    }

    fn set_clean(&mut self, name: &str) {
        self.dirty.remove(name);
    }

    fn connections(&self, name: &str) -> Vec<String> {
        self.connections.get(name).cloned().unwrap_or_default()
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn scene_path(&self) -> String {
        self.scene_path.clone()
    }
}

/// Rebuild the creation spec of an existing attribute
fn spec_of(host: &MemoryHost, info: &AttributeInfo) -> AttributeSpec {
    AttributeSpec {
        name: info.name.clone(),
        ty: info.ty,
        array: info.array,
        readable: info.readable,
        writable: info.writable,
        hidden: info.hidden,
        children: info
            .children
            .iter()
            .filter_map(|c| host.slots.get(c))
            .map(|s| spec_of(host, &s.info))
            .collect(),
    }
}
