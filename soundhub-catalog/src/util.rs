use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Keeps the first occurrence of every id, in order
pub fn dedup_ids<T: PartialEq + Copy>(ids: Vec<T>) -> Vec<T> {
    let mut unique = Vec::with_capacity(ids.len());

    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }

    unique
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_strings_are_alphanumeric() {
        let token = random_string(32);

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_string(32));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        assert_eq!(dedup_ids(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
