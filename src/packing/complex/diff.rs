//! Spatial differencing (order 1 or 2), the optional pre-pass DRT 5.3 adds
//! in front of group packing (C5).

/// Order of spatial differencing applied before group packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    First,
    Second,
}

/// Replaces `values` with first/second differences, returning the leading
/// values needed to reconstruct the series (1 for first order, 2 for
/// second), the overall minimum of the differenced series, and the
/// differenced tail with that minimum subtracted out so every entry is
/// non-negative. DRT 5.3 stores the minimum as one more extension field
/// after the leading values, and group packing runs on the non-negative
/// tail so group references never need a sign bit.
pub fn apply(values: &[i64], order: Order) -> (Vec<i64>, i64, Vec<i64>) {
    let (leading, diffs): (Vec<i64>, Vec<i64>) = match order {
        Order::First => {
            if values.is_empty() {
                return (Vec::new(), 0, Vec::new());
            }
            let first = vec![values[0]];
            let diffs = values.windows(2).map(|w| w[1] - w[0]).collect();
            (first, diffs)
        }
        Order::Second => {
            if values.len() < 2 {
                return (values.to_vec(), 0, Vec::new());
            }
            let firsts = vec![values[0], values[1]];
            let diffs = values
                .windows(3)
                .map(|w| (w[2] - w[1]) - (w[1] - w[0]))
                .collect();
            (firsts, diffs)
        }
    };

    let minimum = diffs.iter().copied().min().unwrap_or(0);
    let normalized = diffs.iter().map(|d| d - minimum).collect();
    (leading, minimum, normalized)
}

/// Inverse of [`apply`].
pub fn undo(first_values: &[i64], diffs: &[i64], order: Order) -> Vec<i64> {
    match order {
        Order::First => {
            let mut out = Vec::with_capacity(diffs.len() + 1);
            let mut prev = first_values[0];
            out.push(prev);
            for &d in diffs {
                prev += d;
                out.push(prev);
            }
            out
        }
        Order::Second => {
            let mut out = Vec::with_capacity(diffs.len() + 2);
            out.push(first_values[0]);
            out.push(first_values[1]);
            let mut prev_diff = first_values[1] - first_values[0];
            for &d in diffs {
                prev_diff += d;
                out.push(out.last().unwrap() + prev_diff);
            }
            out
        }
    }
}
