//! Fixtures shared by unit and integration tests.

/// Data the reference fixtures were computed over.
pub const FIXTURE_DATA: [&str; 5] = ["A", "B", "C", "D", "E"];

/// Root of a tree over [`FIXTURE_DATA`].
pub const FIXTURE_ROOT: &str = "cc7461bf32d59f9249796e6e7691f304a3221825732284b9c049b1dd2c689b56";

/// Root after `C` is replaced with `F`.
pub const FIXTURE_ROOT_AFTER_C_TO_F: &str =
    "2f48bc499259fcbdf8119716a116652f0ac5388a2a63b57478113c78fac8c576";

/// Root after `A` and `D` are replaced with `a` and `d`.
pub const FIXTURE_ROOT_AFTER_AD: &str =
    "619c2cc9c54ad5efdab2306a12be2209e0ff0710c907dc275bdb6ddf55035daf";

/// Root after `A`, `D` and `E` are replaced with `a`, `d` and `e`.
pub const FIXTURE_ROOT_AFTER_ADE: &str =
    "68812a5ef301d5712a0fc4fc923e194418eb17bcfa2cb54272b2be8df915f7d0";

/// `n` distinct values: `v0`, `v1`, ...
pub fn make_data(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("v{}", i)).collect()
}

/// Indices of the bits set in `mask`, lowest first.
pub fn indices_of_mask(mask: u64, n: usize) -> Vec<usize> {
    (0..n).filter(|i| mask & (1u64 << i) != 0).collect()
}

/// The value given to leaf `index` by update round `round`.
pub fn updated_value(index: usize, round: usize) -> String {
    format!("u{}-{}", round, index)
}
