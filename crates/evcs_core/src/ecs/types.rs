//! # Identifiers and Type Tokens
//!
//! Type ids are handed out by a registry in registration order and threaded
//! explicitly to call sites. Nothing is stored on the component types
//! themselves, and ids are only meaningful for the registry that issued them
//! in the current run. Never persist them.

use std::fmt;
use std::marker::PhantomData;

/// Pool-local slot index of a live entity, component, or view.
///
/// Reused after the owner is destroyed. Hold a handle or weak handle instead
/// of a bare id when the target may die.
pub type Identifier = u32;

/// Runtime id of a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentTypeId(u16);

impl ComponentTypeId {
    #[inline]
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the registration index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) const fn class(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime id of a registered view type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ViewTypeId(u16);

impl ViewTypeId {
    #[inline]
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the registration index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ViewTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed token for a registered component type.
///
/// Returned by registration and passed to every typed operation, so the
/// Rust type and the runtime id can never disagree.
pub struct ComponentType<T> {
    id: ComponentTypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentType<T> {
    #[inline]
    pub(crate) const fn new(id: ComponentTypeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the runtime id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ComponentTypeId {
        self.id
    }
}

impl<T> Clone for ComponentType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentType<T> {}

impl<T> fmt::Debug for ComponentType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentType")
            .field(&std::any::type_name::<T>())
            .field(&self.id)
            .finish()
    }
}

impl<T> PartialEq for ComponentType<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ComponentType<T> {}
