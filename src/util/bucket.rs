use sha2::{Digest, Sha256};

/// Deterministically place a user in an experiment bucket.
///
/// `{experiment}:{user_id}` is hashed and mapped onto [0, 1); users below
/// `traffic_split` land in arm A. The same pair always lands in the same arm,
/// and a user's arm in one experiment says nothing about the next.
pub fn assign_bucket(user_id: &str, experiment: &str, traffic_split: f64) -> Bucket {
    let mut hasher = Sha256::new();
    hasher.update(experiment.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    let hash = hasher.finalize();

    let mut num = [0u8; 8];
    num.copy_from_slice(&hash[..8]);
    let value = u64::from_be_bytes(num);

    let fraction = value as f64 / u64::MAX as f64;
    if fraction < traffic_split {
        Bucket::A
    } else {
        Bucket::B
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    A,
    B,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_deterministic() {
        let first = assign_bucket("user-1", "ranker-v2", 0.5);
        for _ in 0..10 {
            assert_eq!(assign_bucket("user-1", "ranker-v2", 0.5), first);
        }
    }

    #[test]
    fn split_extremes() {
        // 0.0 sends everyone to B; near 1.0 almost everyone to A.
        for i in 0..50 {
            let user = format!("user-{}", i);
            assert_eq!(assign_bucket(&user, "exp", 0.0), Bucket::B);
        }
    }

    #[test]
    fn split_roughly_honored() {
        let total = 1000;
        let in_a = (0..total)
            .filter(|i| assign_bucket(&format!("user-{}", i), "exp", 0.3) == Bucket::A)
            .count();
        // loose bound, this only guards against a degenerate hash mapping
        assert!(in_a > total * 2 / 10 && in_a < total * 4 / 10);
    }

    #[test]
    fn different_experiments_rebucket() {
        let mut differs = false;
        for i in 0..100 {
            let user = format!("user-{}", i);
            if assign_bucket(&user, "exp-one", 0.5) != assign_bucket(&user, "exp-two", 0.5) {
                differs = true;
                break;
            }
        }
        assert!(differs);
    }
}
