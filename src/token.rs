//! Scratch-buffer tokens.
//!
//! A [`BufferToken`] stands in for a backend-resolved scratch buffer so that lowering code can be
//! written without knowing how the backend's buffer pool is organized, while still catching
//! lifetime misuse (a stale `TEMP` token, a second `STATIC` allocation) at construction time.

use crate::error::{invariant, GraphError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime discipline of a [`BufferToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferClass {
    /// Valid for the lifetime of the graph; at most one may be issued per graph.
    Static,
    /// Valid only until the next `Temp` token is issued by the same generator.
    Temp,
    /// Sentinel for "no token" (an [`crate::operand::Operand::Addr`] is used instead).
    Invalid,
}

/// Opaque handle to a scratch buffer later resolved by the backend.
///
/// A token carries no memory of its own; `class` and `index` are enough for the backend to look
/// up the concrete address when it processes the primitive carrying this token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferToken {
    pub class: BufferClass,
    pub index: u64,
}

impl BufferToken {
    pub fn invalid() -> Self {
        BufferToken {
            class: BufferClass::Invalid,
            index: u64::MAX,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.class != BufferClass::Invalid
    }
}

/// Issues [`BufferToken`]s and enforces the STATIC/TEMP allocation disciplines.
///
/// `Static` and `Temp` each get their own monotonic counter. At most one `Static` token may ever
/// be issued; `Temp` tokens are unbounded but a token is only valid until the next `Temp` token is
/// issued.
#[derive(Debug, Default)]
pub struct BufferTokenGenerator {
    static_ctr: AtomicU64,
    temp_ctr: AtomicU64,
}

const STATIC_MAX: u64 = 1;

impl BufferTokenGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, class: BufferClass) -> &AtomicU64 {
        match class {
            BufferClass::Static => &self.static_ctr,
            BufferClass::Temp => &self.temp_ctr,
            BufferClass::Invalid => unreachable!("cannot allocate an Invalid-class token"),
        }
    }

    /// Issues the next token of `class`.
    ///
    /// Panics if `class == Static` and a `Static` token has already been issued for this
    /// generator (invariant 4): this is a construction-time programmer error, not a recoverable
    /// condition.
    pub fn generate(&self, class: BufferClass) -> BufferToken {
        let ctr = self.counter(class);
        let next = ctr.fetch_add(1, Ordering::Relaxed);
        if class == BufferClass::Static {
            invariant!(
                next < STATIC_MAX,
                "at most one STATIC buffer token may be issued per graph"
            );
        }
        tracing::trace!(?class, index = next, "issued buffer token");
        BufferToken { class, index: next }
    }

    /// Checks that `token` is still valid, i.e. not a stale `TEMP` token.
    pub fn verify(&self, token: BufferToken) -> Result<(), GraphError> {
        if token.class == BufferClass::Temp {
            let current = self.temp_ctr.load(Ordering::Relaxed);
            if current == 0 || token.index != current - 1 {
                return Err(GraphError::Invariant {
                    what: "stale TEMP buffer",
                    prim_idx: None,
                });
            }
        }
        Ok(())
    }

    /// Whether at least one token of `class` has been issued.
    pub fn has_allocated(&self, class: BufferClass) -> bool {
        self.counter(class).load(Ordering::Relaxed) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_token_is_valid_until_the_next_one() {
        let gen = BufferTokenGenerator::new();
        let t1 = gen.generate(BufferClass::Temp);
        assert!(gen.verify(t1).is_ok());
        let t2 = gen.generate(BufferClass::Temp);
        assert!(gen.verify(t1).is_err(), "t1 should now be stale");
        assert!(gen.verify(t2).is_ok());
    }

    #[test]
    fn static_token_allocates_once() {
        let gen = BufferTokenGenerator::new();
        assert!(!gen.has_allocated(BufferClass::Static));
        let _t = gen.generate(BufferClass::Static);
        assert!(gen.has_allocated(BufferClass::Static));
    }

    #[test]
    #[should_panic(expected = "at most one STATIC")]
    fn second_static_token_panics() {
        let gen = BufferTokenGenerator::new();
        let _t1 = gen.generate(BufferClass::Static);
        let _t2 = gen.generate(BufferClass::Static);
    }

    #[test]
    fn unissued_temp_token_is_never_valid() {
        let gen = BufferTokenGenerator::new();
        let phantom = BufferToken {
            class: BufferClass::Temp,
            index: 0,
        };
        assert!(gen.verify(phantom).is_err());
    }
}
