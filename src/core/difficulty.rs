use crate::core::Block;
use log::info;

/// Difficulty adjustment for keeping block times near the target.
///
/// Every evaluation moves the difficulty by at most one step and never
/// below the configured floor.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Next difficulty for a chain whose newest block is last.
    ///
    /// Compares the time spent on the last `interval` blocks with
    /// `target_block_time_ms * interval`: under 75% raises the difficulty by
    /// one, over 125% lowers it by one, anything in between keeps it.
    /// Chains with fewer than `interval + 1` blocks keep `current`.
    pub fn adjust_difficulty(
        chain: &[Block],
        current: u32,
        target_block_time_ms: u64,
        interval: usize,
        min_difficulty: u32,
    ) -> u32 {
        if interval == 0 || chain.len() < interval + 1 {
            return current;
        }

        let newest = &chain[chain.len() - 1];
        let oldest = &chain[chain.len() - 1 - interval];
        // Timestamps are not required to be monotonic, so the span may be negative
        let time_taken = i128::from(newest.get_timestamp()) - i128::from(oldest.get_timestamp());
        let expected = i128::from(target_block_time_ms) * interval as i128;

        // Integer form of time_taken < 0.75 * expected and > 1.25 * expected
        let next = if time_taken * 4 < expected * 3 {
            current.saturating_add(1)
        } else if time_taken * 4 > expected * 5 {
            current.saturating_sub(1)
        } else {
            current
        };
        let next = next.max(min_difficulty);

        if next != current {
            info!(
                "Difficulty adjustment at height {}: {current} -> {next} (actual: {time_taken}ms, target: {expected}ms)",
                newest.get_height()
            );
        }
        next
    }

    /// Difficulty the next block should be mined at, given the difficulty a
    /// fresh node starts from. Once the chain has mined blocks the tip's
    /// difficulty is the base for adjustment.
    pub fn next_difficulty(
        chain: &[Block],
        initial_difficulty: u32,
        target_block_time_ms: u64,
        interval: usize,
        min_difficulty: u32,
    ) -> u32 {
        let current = match chain.last() {
            Some(tip) if !tip.is_genesis() => tip.get_difficulty(),
            _ => initial_difficulty,
        };
        Self::adjust_difficulty(
            chain,
            current,
            target_block_time_ms,
            interval,
            min_difficulty,
        )
        .max(min_difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use serde_json::json;

    const TARGET_MS: u64 = 10_000;
    const INTERVAL: usize = 10;

    // Builds a chain with the given spacing between blocks. Hashes and PoW do
    // not matter here; only timestamps and difficulty are read.
    fn chain_with_spacing(spacing_ms: i64, difficulty: u32) -> Vec<Block> {
        let genesis = Block::generate_genesis_block(0, vec![]);
        let mut chain = vec![genesis];
        for i in 1..=INTERVAL as i64 {
            let previous = chain.last().unwrap().clone();
            let reward = Transaction::new_reward("miner", 10, i * spacing_ms);
            let block =
                Block::new_candidate(&previous, vec![reward], difficulty, "miner", i * spacing_ms);
            chain.push(block);
        }
        chain
    }

    #[test]
    fn test_insufficient_history_keeps_current() {
        let chain = chain_with_spacing(1, 4);
        let short = &chain[..INTERVAL];
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(short, 4, TARGET_MS, INTERVAL, 1),
            4
        );
    }

    #[test]
    fn test_fast_blocks_raise_by_one() {
        let chain = chain_with_spacing(TARGET_MS as i64 / 2, 4);
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            5
        );
    }

    #[test]
    fn test_slow_blocks_lower_by_one() {
        let chain = chain_with_spacing(TARGET_MS as i64 * 2, 4);
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            3
        );
    }

    #[test]
    fn test_on_target_unchanged() {
        let chain = chain_with_spacing(TARGET_MS as i64, 4);
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            4
        );
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        // Exactly 75% and exactly 125% of the expected span leave it alone
        let at_low = chain_with_spacing(7_500, 4);
        let at_high = chain_with_spacing(12_500, 4);
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&at_low, 4, TARGET_MS, INTERVAL, 1),
            4
        );
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&at_high, 4, TARGET_MS, INTERVAL, 1),
            4
        );
    }

    #[test]
    fn test_floor_at_min_difficulty() {
        let chain = chain_with_spacing(TARGET_MS as i64 * 2, 1);
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&chain, 1, TARGET_MS, INTERVAL, 1),
            1
        );
    }

    #[test]
    fn test_negative_span_counts_as_fast() {
        let mut chain = chain_with_spacing(TARGET_MS as i64, 4);
        let mut value = serde_json::to_value(chain.last().unwrap()).unwrap();
        value["timestamp"] = json!(-1);
        *chain.last_mut().unwrap() = serde_json::from_value(value).unwrap();
        assert_eq!(
            DifficultyAdjustment::adjust_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            5
        );
    }

    #[test]
    fn test_fresh_chain_uses_initial_difficulty() {
        let chain = vec![Block::generate_genesis_block(0, vec![])];
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            4
        );
    }

    #[test]
    fn test_next_difficulty_follows_tip() {
        let chain = chain_with_spacing(TARGET_MS as i64 / 2, 3);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&chain, 4, TARGET_MS, INTERVAL, 1),
            4
        );
    }
}
