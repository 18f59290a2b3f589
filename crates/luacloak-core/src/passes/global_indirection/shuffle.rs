//! Reproducible argument shuffle.
//!
//! The same linear congruential recurrence permutes the packed argument
//! list at run time (emitted as Lua by [`render_lua`]) and predicts, at
//! obfuscation time, where a given argument ends up ([`predict_slot`]).
//! Both sides must agree exactly for every seed and count.

const MODULUS: u64 = 1 << 31;
const MULTIPLIER: u64 = 1_103_515_245;
const INCREMENT: u64 = 12_345;

// MULTIPLIER == MULTIPLIER_HIGH * 65536 + MULTIPLIER_LOW. The emitted Lua
// multiplies by the halves so no intermediate exceeds 2^53.
const MULTIPLIER_HIGH: u64 = 16_838;
const MULTIPLIER_LOW: u64 = 20_077;

/// Seeds are kept below the modulus so the first step is exact in Lua too.
pub const SEED_LIMIT: u64 = MODULUS;

pub fn lcg_next(state: u64) -> u64 {
    (MULTIPLIER * (state % MODULUS) + INCREMENT) % MODULUS
}

/// Arrangement of `count` slots after the shuffle: `result[slot]` is the
/// original index of the value now in `slot` (both 0-based).
pub fn permutation(seed: u64, count: usize) -> Vec<usize> {
    let mut arrangement: Vec<usize> = (0..count).collect();
    let mut state = seed;
    for i in (2..=count).rev() {
        state = lcg_next(state);
        // 1-based like the Lua side
        let j = (state % i as u64) as usize + 1;
        arrangement.swap(i - 1, j - 1);
    }
    arrangement
}

/// The 0-based slot that the value originally at `original` occupies after
/// the shuffle, or `None` if `original` is out of range.
pub fn predict_slot(seed: u64, count: usize, original: usize) -> Option<usize> {
    permutation(seed, count)
        .iter()
        .position(|&index| index == original)
}

/// Names used by the emitted shuffle loop.
#[derive(Debug, Clone)]
pub struct ShuffleNames {
    pub table: String,
    pub state: String,
    pub counter: String,
    pub pick: String,
}

/// Lua statements shuffling `names.table[1..=count]` in place, the run-time
/// twin of [`permutation`].
pub fn render_lua(names: &ShuffleNames, seed: u64, count: usize) -> String {
    let ShuffleNames {
        table,
        state,
        counter,
        pick,
    } = names;
    format!(
        "local {state} = {seed}\n\
         for {counter} = {count}, 2, -1 do\n\
         {state} = (({high} * {state} % {modulus}) * 65536 + {low} * {state} + {increment}) % {modulus}\n\
         local {pick} = {state} % {counter} + 1\n\
         {table}[{counter}], {table}[{pick}] = {table}[{pick}], {table}[{counter}]\n\
         end\n",
        seed = seed % MODULUS,
        high = MULTIPLIER_HIGH,
        low = MULTIPLIER_LOW,
        increment = INCREMENT,
        modulus = MODULUS,
    )
}
