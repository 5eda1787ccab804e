//! Search-precision arithmetic: which times bisection can reach, and when two
//! requested times would land on the same frame.

use std::collections::BTreeMap;

use crate::fraction;

/// Time bisection actually reaches when aiming for `target` with `precision` halvings.
pub fn predicted_hit(target: f64, precision: u32) -> f64 {
    let scale = 2f64.powi(precision as i32);
    (target * scale).round() / scale
}

/// Requested times that share a predicted hit with at least one other.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub hit: f64,
    pub targets: Vec<f64>,
}

/// Group `targets` by predicted hit and return the groups with more than one member,
/// in ascending order of hit.
pub fn colliding_targets(targets: &[f64], precision: u32) -> Vec<Collision> {
    let mut by_hit: BTreeMap<String, Collision> = BTreeMap::new();
    for &target in targets {
        let hit = predicted_hit(target, precision);
        by_hit
            .entry(fraction::encode(hit))
            .or_insert_with(|| Collision {
                hit,
                targets: Vec::new(),
            })
            .targets
            .push(target);
    }
    by_hit
        .into_values()
        .filter(|collision| collision.targets.len() > 1)
        .collect()
}

/// Depth at which bisection reaches every multiple of `1 / expand` exactly,
/// available only when `expand` is a power of two.
pub fn exact_precision(expand: u64) -> Option<u32> {
    expand.is_power_of_two().then(|| expand.trailing_zeros())
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

pub fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicted_hit_rounds_to_dyadic_grid() {
        assert_eq!(predicted_hit(0.375, 3), 0.375);
        assert_eq!(predicted_hit(1.0 / 3.0, 3), 0.375);
        assert_eq!(predicted_hit(0.2, 2), 0.25);
        assert_eq!(predicted_hit(0.7, 0), 1.0);
        assert_eq!(predicted_hit(0.4, 0), 0.0);
    }

    #[test]
    fn fifths_collide_at_low_precision() {
        let targets = [0.2, 0.4, 0.6, 0.8];
        let collisions = colliding_targets(&targets, 2);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].hit, 0.5);
        assert_eq!(collisions[0].targets, vec![0.4, 0.6]);
        assert!(colliding_targets(&targets, 4).is_empty());
    }

    #[test]
    fn powers_of_two_have_exact_precision() {
        assert_eq!(exact_precision(1), Some(0));
        assert_eq!(exact_precision(4), Some(2));
        assert_eq!(exact_precision(8), Some(3));
        assert_eq!(exact_precision(5), None);
        assert_eq!(exact_precision(0), None);
    }

    #[test]
    fn lcm_of_common_frame_rates() {
        assert_eq!(gcd(24, 30), 6);
        assert_eq!(lcm(24, 30), 120);
        assert_eq!(lcm(25, 50), 50);
        assert_eq!(lcm(0, 30), 0);
    }
}
