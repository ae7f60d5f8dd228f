//! Persona aspect graph: a weighted relevance graph over discrete slices of a
//! persona definition, queried under a token budget.

pub mod aspect;
pub mod graph;

pub use aspect::{PersonaAspect, estimate_tokens, terms};
pub use graph::{
    PersonaError, PersonaGraphEdge, PersonaGraphNode, PersonaGraphStore, PersonaSelection,
    SelectionBudget,
};
