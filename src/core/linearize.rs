use super::layout::{MinOfTwo, SignedSplit};
use super::system::{BIG_M, Bounds, ConstraintSystem, Row};

/// Splits an unconstrained value into non-negative parts with at most one of
/// them non-zero: `value = positive - negative`, `|value| <= M`, and a binary
/// indicator selecting which side may be non-zero.
pub fn split_signed(system: &mut ConstraintSystem, split: SignedSplit) {
    system.set_bounds(split.value, Bounds::FREE);
    system.mark_binary(split.indicator);

    system.add_equality(
        Row::new()
            .with(split.value, 1.0)
            .with(split.positive, -1.0)
            .with(split.negative, 1.0),
        0.0,
    );

    system.add_inequality(Row::new().with(split.value, 1.0), BIG_M);
    system.add_inequality(Row::new().with(split.value, -1.0), BIG_M);

    // positive <= M * b
    system.add_inequality(
        Row::new()
            .with(split.positive, 1.0)
            .with(split.indicator, -BIG_M),
        0.0,
    );
    // negative <= M * (1 - b)
    system.add_inequality(
        Row::new()
            .with(split.negative, 1.0)
            .with(split.indicator, BIG_M),
        BIG_M,
    );
}

/// Forces `result = min(a, b)` for `a, b` in `[-M, M]` with two binary
/// indicators, exactly one of which is set.
pub fn min_of_two(system: &mut ConstraintSystem, min: MinOfTwo) {
    system.mark_binary(min.a_indicator);
    system.mark_binary(min.b_indicator);

    system.add_inequality(Row::new().with(min.result, 1.0).with(min.a, -1.0), 0.0);
    system.add_inequality(Row::new().with(min.result, 1.0).with(min.b, -1.0), 0.0);

    system.add_equality(
        Row::new()
            .with(min.a_indicator, 1.0)
            .with(min.b_indicator, 1.0),
        1.0,
    );

    // a - result <= 2M * (1 - a_indicator)
    system.add_inequality(
        Row::new()
            .with(min.result, -1.0)
            .with(min.a, 1.0)
            .with(min.a_indicator, 2.0 * BIG_M),
        2.0 * BIG_M,
    );
    system.add_inequality(
        Row::new()
            .with(min.result, -1.0)
            .with(min.b, 1.0)
            .with(min.b_indicator, 2.0 * BIG_M),
        2.0 * BIG_M,
    );
}
