//! Stable numeric error codes returned to the controller (§4.1, §7).
//!
//! These are wire constants, not `crate::Error` variants: `crate::Error` is
//! reserved for startup/ambient failures that abort the process, while an
//! `Ecode` is always recoverable and gets written back to the controller as
//! `E<code>` and logged, never propagated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ecode(pub u8);

impl Ecode {
    pub const SYNTAX_ARITY: Ecode = Ecode(1);
    pub const SYNTAX_MODIFIER: Ecode = Ecode(2);
    pub const UNKNOWN_VERB: Ecode = Ecode(3);
    pub const SYNTAX_NUMBER: Ecode = Ecode(4);
    pub const ALLOC: Ecode = Ecode(5);
    pub const PLAYER: Ecode = Ecode(6);
    pub const LISTENER: Ecode = Ecode(7);
    pub const NOTFOUND: Ecode = Ecode(8);
    pub const LISTENER2: Ecode = Ecode(10);
    pub const ALLOC2: Ecode = Ecode(11);
    pub const ALLOC3: Ecode = Ecode(12);
    pub const ALLOC4: Ecode = Ecode(13);
    pub const ALLOC5: Ecode = Ecode(14);
}

impl std::fmt::Display for Ecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.0)
    }
}
