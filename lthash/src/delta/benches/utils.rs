use rand::{rngs::StdRng, Rng, SeedableRng};
use statesum_lthash::KeyChange;

/// Generate `n` changes with 32-byte keys and 64-byte values.
pub fn get_random_changes(n: usize) -> Vec<KeyChange> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..n)
        .map(|_| {
            let key: [u8; 32] = rng.gen();
            let mut old = [0u8; 64];
            let mut new = [0u8; 64];
            rng.fill(&mut old[..]);
            rng.fill(&mut new[..]);
            KeyChange::update(&key, &old, &new)
        })
        .collect()
}
