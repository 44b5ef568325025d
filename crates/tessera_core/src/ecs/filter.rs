//! # Filters
//!
//! Immutable predicates over archetype masks and relation targets.
//!
//! ```rust,ignore
//! // Position and Velocity, but not Frozen
//! let moving = Filter::all(&[pos, vel]).without(&[frozen]);
//! // Exactly {Tag}, nothing else
//! let tags = MaskFilter::all(&[tag]).exclusive();
//! // Children of `parent`
//! let children = Filter::all(&[child_of]).with_target(parent);
//! ```
//!
//! `exclusive` is a property of a single [`MaskFilter`] leaf. It is never
//! distributed over `And`/`Or`: `And(exclusive {A}, all {B})` can not
//! match anything, because no mask equals `{A}` and also contains `B`.

use std::ops::{BitAnd, BitOr, BitXor, Not};

use super::archetype::Archetype;
use super::component::ComponentId;
use super::entity::Entity;
use super::mask::Mask;

/// Leaf predicate over a mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MaskFilter {
    /// Components that must be present.
    pub all: Mask,
    /// Components that must be absent.
    pub none: Mask,
    /// Require the mask to equal `all` exactly.
    pub exact: bool,
}

impl MaskFilter {
    /// Matches masks containing every id in `ids`.
    #[must_use]
    pub fn all(ids: &[ComponentId]) -> Self {
        Self {
            all: Mask::new(ids),
            ..Self::default()
        }
    }

    /// Additionally excludes masks containing any of `ids`.
    #[must_use]
    pub fn without(mut self, ids: &[ComponentId]) -> Self {
        for &id in ids {
            self.none.set(id, true);
        }
        self
    }

    /// Only matches masks equal to `all`.
    #[must_use]
    pub const fn exclusive(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Evaluates the predicate.
    #[inline]
    #[must_use]
    pub fn matches(&self, mask: &Mask) -> bool {
        mask.contains_all(&self.all)
            && !mask.contains_any(&self.none)
            && (!self.exact || *mask == self.all)
    }
}

/// A query predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Leaf mask test.
    Mask(MaskFilter),
    /// Both sides match.
    And(Box<Filter>, Box<Filter>),
    /// Either side matches.
    Or(Box<Filter>, Box<Filter>),
    /// Exactly one side matches.
    Xor(Box<Filter>, Box<Filter>),
    /// The inner filter does not match.
    Not(Box<Filter>),
    /// The inner filter matches and the archetype has rows related to
    /// `target`. The zero target matches any target.
    Relation {
        /// Predicate on the mask.
        inner: Box<Filter>,
        /// Required relation target.
        target: Entity,
    },
}

/// Three-valued mask-time verdict. `Maybe` depends on which targets are
/// currently populated and is settled at query time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    No,
    Maybe,
    Yes,
}

impl Verdict {
    fn and(self, other: impl FnOnce() -> Self) -> Self {
        match self {
            Self::No => Self::No,
            Self::Yes => other(),
            Self::Maybe => match other() {
                Self::No => Self::No,
                _ => Self::Maybe,
            },
        }
    }

    fn or(self, other: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Yes => Self::Yes,
            Self::No => other(),
            Self::Maybe => match other() {
                Self::Yes => Self::Yes,
                _ => Self::Maybe,
            },
        }
    }

    fn xor(self, other: Self) -> Self {
        match (self, other) {
            (Self::Maybe, _) | (_, Self::Maybe) => Self::Maybe,
            (a, b) if a == b => Self::No,
            _ => Self::Yes,
        }
    }

    fn negate(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
            Self::Maybe => Self::Maybe,
        }
    }
}

impl Filter {
    /// Matches every archetype.
    #[must_use]
    pub fn any() -> Self {
        Self::Mask(MaskFilter::default())
    }

    /// Matches masks containing every id in `ids`.
    #[must_use]
    pub fn all(ids: &[ComponentId]) -> Self {
        Self::Mask(MaskFilter::all(ids))
    }

    /// Matches masks containing at least one id in `ids`.
    #[must_use]
    pub fn one_of(ids: &[ComponentId]) -> Self {
        ids.iter()
            .map(|&id| Self::all(&[id]))
            .reduce(Self::or)
            .unwrap_or_else(|| Self::any().negate())
    }

    /// Matches masks containing none of `ids`.
    #[must_use]
    pub fn none_of(ids: &[ComponentId]) -> Self {
        Self::Mask(MaskFilter::default().without(ids))
    }

    /// Excludes masks containing any of `ids`.
    ///
    /// Folded into a mask leaf when possible.
    #[must_use]
    pub fn without(self, ids: &[ComponentId]) -> Self {
        match self {
            Self::Mask(leaf) => Self::Mask(leaf.without(ids)),
            Self::Relation { inner, target } => Self::Relation {
                inner: Box::new(inner.without(ids)),
                target,
            },
            other => other.and(Self::none_of(ids)),
        }
    }

    /// Marks the outermost mask leaf as exclusive.
    ///
    /// # Panics
    ///
    /// Panics on boolean combinators: exactness belongs to one leaf.
    #[must_use]
    pub fn exclusive(self) -> Self {
        match self {
            Self::Mask(leaf) => Self::Mask(leaf.exclusive()),
            Self::Relation { inner, target } => Self::Relation {
                inner: Box::new(inner.exclusive()),
                target,
            },
            _ => panic!("exclusive() applies to a mask filter, not to a combinator"),
        }
    }

    /// Both filters match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Either filter matches.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Exactly one filter matches.
    #[must_use]
    pub fn xor(self, other: Self) -> Self {
        Self::Xor(Box::new(self), Box::new(other))
    }

    /// Inverts the filter.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Restricts to rows related to `target`.
    #[must_use]
    pub fn with_target(self, target: Entity) -> Self {
        Self::Relation {
            inner: Box::new(self),
            target,
        }
    }

    /// Target the query's rows are scoped to, if any.
    ///
    /// Only an outermost relation filter with a non-zero target narrows
    /// iteration to one partition; nested ones only select archetypes.
    #[inline]
    pub(crate) fn scope(&self) -> Option<Entity> {
        match self {
            Self::Relation { target, .. } if !target.is_zero() => Some(*target),
            _ => None,
        }
    }

    /// Evaluates against a mask, treating every relation constraint as
    /// satisfied.
    #[must_use]
    pub fn matches_mask(&self, mask: &Mask) -> bool {
        match self {
            Self::Mask(leaf) => leaf.matches(mask),
            Self::And(a, b) => a.matches_mask(mask) && b.matches_mask(mask),
            Self::Or(a, b) => a.matches_mask(mask) || b.matches_mask(mask),
            Self::Xor(a, b) => a.matches_mask(mask) != b.matches_mask(mask),
            Self::Not(f) => !f.matches_mask(mask),
            Self::Relation { inner, .. } => inner.matches_mask(mask),
        }
    }

    /// Evaluates against an archetype in its current state.
    pub(crate) fn matches(&self, archetype: &Archetype) -> bool {
        match self {
            Self::Mask(leaf) => leaf.matches(archetype.mask()),
            Self::And(a, b) => a.matches(archetype) && b.matches(archetype),
            Self::Or(a, b) => a.matches(archetype) || b.matches(archetype),
            Self::Xor(a, b) => a.matches(archetype) != b.matches(archetype),
            Self::Not(f) => !f.matches(archetype),
            Self::Relation { inner, target } => {
                inner.matches(archetype) && (target.is_zero() || archetype.has_target(*target))
            }
        }
    }

    /// Verdict from the mask and relation component alone.
    pub(crate) fn classify(&self, mask: &Mask, relation: Option<ComponentId>) -> Verdict {
        match self {
            Self::Mask(leaf) => {
                if leaf.matches(mask) {
                    Verdict::Yes
                } else {
                    Verdict::No
                }
            }
            Self::And(a, b) => a.classify(mask, relation).and(|| b.classify(mask, relation)),
            Self::Or(a, b) => a.classify(mask, relation).or(|| b.classify(mask, relation)),
            Self::Xor(a, b) => a.classify(mask, relation).xor(b.classify(mask, relation)),
            Self::Not(f) => f.classify(mask, relation).negate(),
            Self::Relation { inner, target } => {
                let inner = inner.classify(mask, relation);
                if target.is_zero() {
                    inner
                } else if relation.is_none() {
                    Verdict::No
                } else {
                    inner.and(|| Verdict::Maybe)
                }
            }
        }
    }
}

impl From<MaskFilter> for Filter {
    fn from(leaf: MaskFilter) -> Self {
        Self::Mask(leaf)
    }
}

impl BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl BitXor for Filter {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        self.xor(rhs)
    }
}

impl Not for Filter {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}
