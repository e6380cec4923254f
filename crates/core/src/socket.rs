use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, SocketId};
use crate::value::{SocketValue, TypeMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketRole {
    pub input: bool,
    pub output: bool,
    pub control: bool,
    pub variable: bool,
    pub secret: bool,
}

impl SocketRole {
    pub fn input() -> Self {
        Self {
            input: true,
            ..Self::default()
        }
    }

    pub fn output() -> Self {
        Self {
            output: true,
            ..Self::default()
        }
    }

    pub fn input_flow() -> Self {
        Self {
            input: true,
            control: true,
            ..Self::default()
        }
    }

    pub fn output_flow() -> Self {
        Self {
            output: true,
            control: true,
            ..Self::default()
        }
    }

    /// Acts as both directions for hybrid evaluation.
    pub fn variable() -> Self {
        Self {
            input: true,
            output: true,
            variable: true,
            ..Self::default()
        }
    }
}

/// Shape of a socket before it is attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketDefinition {
    pub name: String,
    pub type_mask: TypeMask,
    pub default_value: SocketValue,
    pub secret: bool,
}

impl SocketDefinition {
    pub fn new(name: impl Into<String>, type_mask: TypeMask) -> Self {
        Self {
            name: name.into(),
            type_mask,
            default_value: SocketValue::None,
            secret: false,
        }
    }

    pub fn flow(name: impl Into<String>) -> Self {
        Self::new(name, TypeMask::FLOW)
    }

    pub fn with_default(mut self, value: impl Into<SocketValue>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Socket {
    pub id: SocketId,
    /// Unique within the owning node; this is what gets persisted.
    pub local_id: u32,
    pub node: NodeId,
    pub name: String,
    pub type_mask: TypeMask,
    pub role: SocketRole,
    pub stored_value: SocketValue,
    pub default_value: SocketValue,
}

impl Socket {
    pub(crate) fn new(
        id: SocketId,
        local_id: u32,
        node: NodeId,
        definition: SocketDefinition,
        mut role: SocketRole,
    ) -> Self {
        role.secret |= definition.secret;
        Self {
            id,
            local_id,
            node,
            name: definition.name,
            type_mask: definition.type_mask,
            role,
            stored_value: SocketValue::None,
            default_value: definition.default_value,
        }
    }

    /// Checked from the consuming side: `self` is the input, `producer` the output.
    pub fn accept_edge(&self, producer: &Socket) -> bool {
        producer.role.output
            && self.role.input
            && self.type_mask.intersects(producer.type_mask)
            && self.role.control == producer.role.control
            && self.role.variable == producer.role.variable
    }

    pub fn value(&self) -> &SocketValue {
        if self.stored_value.is_none() {
            &self.default_value
        } else {
            &self.stored_value
        }
    }

    pub fn store_value(&mut self, value: SocketValue) {
        self.stored_value = value;
    }

    pub fn clear_value(&mut self) {
        self.stored_value = SocketValue::None;
    }

    pub fn is_input(&self) -> bool {
        self.role.input
    }

    pub fn is_output(&self) -> bool {
        self.role.output
    }

    pub fn is_control(&self) -> bool {
        self.role.control
    }
}

/// A producer/consumer pair as recorded in the graph's edge relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub producer: SocketId,
    pub consumer: SocketId,
}

impl Connection {
    pub fn new(producer: SocketId, consumer: SocketId) -> Self {
        Self { producer, consumer }
    }
}
