//! The disk arena (C1) and generic persistent AVL tree engine (C2) that
//! every on-disk tree in the index is built from.

pub mod arena;
pub mod avl;

pub use arena::{Arena, ArenaMut, ArenaReader, ArenaWriter, Footer, Header};
pub use avl::{
    find, height, insert, max, min, predecessor, rank, remove, select, subtree_annotation,
    successor, walk, Annotated, Infinity, KeyCmp, NoAnnotation, Order, Payload, NIL,
};
