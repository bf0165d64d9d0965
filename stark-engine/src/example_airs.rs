//! Small AIRs with matching trace generators, for tests, benchmarks, and as
//! a template for writing your own.

use twenty_first::prelude::*;

use crate::air::Air;

pub const FIBONACCI_COLUMN_A: usize = 0;
pub const FIBONACCI_COLUMN_B: usize = 1;
pub const FIBONACCI_COLUMN_AB: usize = 2;

/// Three columns `a`, `b`, and `ab`. Rows advance the Fibonacci sequence:
/// `a' = b` and `b' = a + b`, starting from `a = b = 1`. Column `ab` holds the
/// product `a·b`, which makes the AIR non-linear.
///
/// The terminal constraint fixes column `b` in the last of `num_rows` rows.
pub fn fibonacci_air(num_rows: usize) -> Air {
    let (_, expected_b) = fibonacci_pair_in_row(num_rows.saturating_sub(1));
    let one = bfe!(1);

    Air::new(3)
        .with_initial_constraint("a starts at 1", 1, move |row| row[FIBONACCI_COLUMN_A] - one)
        .with_initial_constraint("b starts at 1", 1, move |row| row[FIBONACCI_COLUMN_B] - one)
        .with_consistency_constraint("ab is a·b", 2, |row| {
            row[FIBONACCI_COLUMN_AB] - row[FIBONACCI_COLUMN_A] * row[FIBONACCI_COLUMN_B]
        })
        .with_transition_constraint("a' is b", 1, |current, next| {
            next[FIBONACCI_COLUMN_A] - current[FIBONACCI_COLUMN_B]
        })
        .with_transition_constraint("b' is a + b", 1, |current, next| {
            next[FIBONACCI_COLUMN_B] - current[FIBONACCI_COLUMN_A] - current[FIBONACCI_COLUMN_B]
        })
        .with_terminal_constraint("b ends at the expected value", 1, move |row| {
            row[FIBONACCI_COLUMN_B] - expected_b
        })
}

/// The trace satisfying [`fibonacci_air`] of the same height, column by
/// column.
pub fn fibonacci_trace(num_rows: usize) -> Vec<Vec<BFieldElement>> {
    let mut columns = vec![Vec::with_capacity(num_rows); 3];
    let (mut a, mut b) = (bfe!(1), bfe!(1));
    for _ in 0..num_rows {
        columns[FIBONACCI_COLUMN_A].push(a);
        columns[FIBONACCI_COLUMN_B].push(b);
        columns[FIBONACCI_COLUMN_AB].push(a * b);
        (a, b) = (b, a + b);
    }

    columns
}

fn fibonacci_pair_in_row(row_index: usize) -> (BFieldElement, BFieldElement) {
    let (mut a, mut b) = (bfe!(1), bfe!(1));
    for _ in 0..row_index {
        (a, b) = (b, a + b);
    }
    (a, b)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use assert2::assert;
    use test_strategy::proptest;

    use super::*;

    #[test]
    fn fibonacci_trace_starts_as_expected() {
        let trace = fibonacci_trace(6);
        assert!(bfe_vec![1, 1, 2, 3, 5, 8] == trace[FIBONACCI_COLUMN_A]);
        assert!(bfe_vec![1, 2, 3, 5, 8, 13] == trace[FIBONACCI_COLUMN_B]);
        assert!(bfe_vec![1, 2, 6, 15, 40, 104] == trace[FIBONACCI_COLUMN_AB]);
    }

    #[proptest]
    fn all_columns_have_the_requested_height(#[strategy(0_usize..100)] num_rows: usize) {
        let trace = fibonacci_trace(num_rows);
        assert!(3 == trace.len());
        assert!(trace.iter().all(|column| column.len() == num_rows));
    }

    #[test]
    fn air_has_one_column_per_trace_column() {
        let air = fibonacci_air(8);
        assert!(fibonacci_trace(8).len() == air.num_columns());
        assert!(6 == air.num_constraints());
        assert!(2 == air.max_constraint_degree());
    }

    #[test]
    fn terminal_value_depends_on_height() {
        let (_, last_b) = fibonacci_pair_in_row(7);
        let trace = fibonacci_trace(8);
        assert!(Some(&last_b) == trace[FIBONACCI_COLUMN_B].last());
    }
}
