//! Referral code generation.
//!
//! A code embeds the owning account id (base36) followed by a short random
//! suffix. Collisions are vanishingly rare but handled anyway: the caller
//! supplies a `taken` predicate and the suffix is regenerated until the code
//! is globally unique.

use crate::account::AccountId;
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 4;

pub fn generate_code<F>(id: AccountId, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let stem = base36(id.unsigned_abs());
    loop {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let code = format!("{}{}", stem, suffix).to_uppercase();
        if !taken(&code) {
            return code;
        }
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}
