//! Assignment of trustees to mix-chain positions.
//!
//! For item p the assignment is a cyclic shift of the trustee order, so
//! the expensive first mix (no upstream mix to wait on) rotates across
//! trustees as p varies.

/// Position in the mix chain (1-based) at which `trustee` mixes item
/// `item`, with `n` trustees.
pub fn mix_position(trustee: u32, item: u32, n: u32) -> u32 {
    ((trustee - 1) + (item - 1)) % n + 1
}

/// Inverse of [`mix_position`]: the trustee mixing at `position`.
pub fn trustee_at_position(position: u32, item: u32, n: u32) -> u32 {
    ((position - 1) + n - ((item - 1) % n)) % n + 1
}

/// The trustee that assembles and first-signs the plaintexts of `item`.
pub fn decryptor(item: u32, n: u32) -> u32 {
    ((item - 1) % n) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bijective() {
        for n in 2..=7 {
            for item in 1..=12 {
                for trustee in 1..=n {
                    let position = mix_position(trustee, item, n);
                    assert!((1..=n).contains(&position));
                    assert_eq!(trustee_at_position(position, item, n), trustee);
                }
                for position in 1..=n {
                    let trustee = trustee_at_position(position, item, n);
                    assert_eq!(mix_position(trustee, item, n), position);
                }
            }
        }
    }

    #[test]
    fn test_is_permutation() {
        for n in 2..=7 {
            for item in 1..=12 {
                let positions: HashSet<u32> =
                    (1..=n).map(|t| mix_position(t, item, n)).collect();
                assert_eq!(positions, (1..=n).collect::<HashSet<u32>>());
            }
        }
    }

    #[test]
    fn test_first_mixer_rotates() {
        let n = 3;
        let first_mixers: Vec<u32> = (1..=6).map(|item| trustee_at_position(1, item, n)).collect();
        assert_eq!(first_mixers, vec![1, 3, 2, 1, 3, 2]);
    }

    #[test]
    fn test_decryptor_rotates() {
        assert_eq!(decryptor(1, 2), 1);
        assert_eq!(decryptor(2, 2), 2);
        assert_eq!(decryptor(3, 2), 1);
        assert_eq!(decryptor(4, 3), 1);
    }
}
