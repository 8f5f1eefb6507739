//! The address-or-token operand invariant.

use crate::token::BufferToken;

/// Exactly one addressing method for a primitive operand: a raw device address, or a scratch
/// buffer token resolved by the backend at processing time.
///
/// Earlier designs of this kind of primitive carried two optional fields (`addr: Option<u64>`,
/// `token: Option<BufferToken>`) and asserted at runtime that exactly one was set. Modeling the
/// choice as an enum makes the invalid "both" and "neither" states unrepresentable.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Addr(u64),
    Token(BufferToken),
}

impl Operand {
    pub fn is_token(&self) -> bool {
        matches!(self, Operand::Token(_))
    }

    pub fn as_token(&self) -> Option<BufferToken> {
        match self {
            Operand::Token(t) => Some(*t),
            Operand::Addr(_) => None,
        }
    }

    pub fn as_addr(&self) -> Option<u64> {
        match self {
            Operand::Addr(a) => Some(*a),
            Operand::Token(_) => None,
        }
    }
}

impl From<u64> for Operand {
    fn from(addr: u64) -> Self {
        Operand::Addr(addr)
    }
}

impl From<BufferToken> for Operand {
    fn from(token: BufferToken) -> Self {
        Operand::Token(token)
    }
}
