//! Batch digest verification of BXPK members.
//!
//! Hashing dominates the cost of checking a large archive, and members are
//! independent, so with the `parallel` feature the digests are computed on
//! the rayon pool.  Without it the same work runs sequentially.  Results are
//! always reported in archive order.

use crate::bxpk::Member;
use crate::error::FormatError;

/// Outcome of checking one member.
#[derive(Debug)]
pub struct DigestCheck<'m> {
    pub index:  usize,
    pub name:   &'m str,
    pub result: Result<(), FormatError>,
}

impl DigestCheck<'_> {
    pub fn is_ok(&self) -> bool { self.result.is_ok() }
}

/// Check every member's stored digest against its content.
pub fn verify_members<'m, 'a>(members: &'m [Member<'a>]) -> Vec<DigestCheck<'m>> {
    let check = |(index, m): (usize, &'m Member<'a>)| DigestCheck {
        index,
        name:   m.name.as_str(),
        result: m.verify(),
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        members.par_iter().enumerate().map(check).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        members.iter().enumerate().map(check).collect()
    }
}

/// Number of failed checks.
pub fn failures(checks: &[DigestCheck<'_>]) -> usize {
    checks.iter().filter(|c| !c.is_ok()).count()
}
