//! Constant-time equality.
//!
//! Every secret comparison in the workspace (API key secrets, HMAC tags)
//! goes through this single helper so no call site can regress into a
//! fast-path `==` that leaks timing.

use subtle::ConstantTimeEq;

/// Constant-time byte equality.
///
/// Takes the same amount of time regardless of how many bytes match.
/// Inputs of different lengths are compared against length-padded copies
/// (with distinct pad bytes, so padding can never produce a false match)
/// to avoid a length oracle from an early return.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a);
    b_padded[..b.len()].copy_from_slice(b);

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
