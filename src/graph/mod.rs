//! Node arena for flattened values.
//!
//! This module defines `LocalId`, `Node` and `FlatGraph`, the in-memory form a
//! value takes between the flattener and the store.

/// Defines the `FlatGraph` arena and the `Node` structure.
pub mod core;
/// Defines the `LocalId` type.
pub mod id;

pub use self::core::{FlatGraph, Node, NodePayload};
pub use self::id::LocalId;
