//! Text rendering for results, goals and estimates

use std::fmt;

use serde::Serialize;

use crate::analysis::{Estimate, GoalProbability, Results};

/// Qualitative band for a goal probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalOutlook {
    /// At least an even chance.
    Likely,
    /// Between one in four and one in two.
    Possible,
    Unlikely,
}

impl GoalOutlook {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.5 {
            GoalOutlook::Likely
        } else if probability >= 0.25 {
            GoalOutlook::Possible
        } else {
            GoalOutlook::Unlikely
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GoalOutlook::Likely => "likely",
            GoalOutlook::Possible => "possible",
            GoalOutlook::Unlikely => "unlikely",
        }
    }
}

impl fmt::Display for GoalOutlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Multi-line statistics summary.
pub struct StatisticsBlock<'a>(pub &'a Results);

impl fmt::Display for StatisticsBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        let row = |f: &mut fmt::Formatter<'_>, label: &str, value: f64| {
            writeln!(f, "  {label:<22}{:>20}", group_thousands(value, 4))
        };

        writeln!(f, "Simulation statistics ({} trials)", r.count())?;
        writeln!(f)?;
        writeln!(f, "  Central tendency")?;
        row(f, "mean", r.mean())?;
        row(f, "median", r.median())?;
        writeln!(f)?;
        writeln!(f, "  Dispersion")?;
        row(f, "std deviation", r.std_dev())?;
        row(f, "minimum", r.min())?;
        row(f, "maximum", r.max())?;
        writeln!(f)?;
        writeln!(f, "  Percentiles")?;
        row(f, "p2.5", r.p2_5())?;
        row(f, "p25 (Q1)", r.p25())?;
        row(f, "p75 (Q3)", r.p75())?;
        row(f, "p97.5", r.p97_5())?;
        writeln!(f)?;
        let (lo, hi) = r.confidence_interval();
        write!(
            f,
            "  95% interval: [{}  -  {}]",
            group_thousands(lo, 4),
            group_thousands(hi, 4)
        )
    }
}

/// One-line goal summary: percentile, probability and outlook.
pub fn goal_line(target: f64, goal: &GoalProbability) -> String {
    let outlook = GoalOutlook::from_probability(goal.probability);
    format!(
        "goal {}: percentile {:.2} | probability of reaching {:.2}% ({outlook})",
        group_thousands(target, 2),
        goal.percentile_of_target,
        goal.probability * 100.0
    )
}

/// One-line estimate summary.
pub fn estimate_line(estimate: &Estimate) -> String {
    format!(
        "expected value: {} | percentile {:.2}",
        format_compact(estimate.expected_value),
        estimate.percentile_of_expected_value
    )
}

/// Two-decimal rendering with `M` and `B` suffixes for large magnitudes.
pub fn format_compact(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e9 {
        format!("{}B", group_thousands(value / 1e9, 2))
    } else if magnitude >= 1e6 {
        format!("{}M", group_thousands(value / 1e6, 2))
    } else {
        group_thousands(value, 2)
    }
}

/// Fixed-point rendering with `,` between thousands.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && text.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;

    #[test]
    fn outlook_bands() {
        assert_eq!(GoalOutlook::from_probability(0.9), GoalOutlook::Likely);
        assert_eq!(GoalOutlook::from_probability(0.5), GoalOutlook::Likely);
        assert_eq!(GoalOutlook::from_probability(0.49), GoalOutlook::Possible);
        assert_eq!(GoalOutlook::from_probability(0.25), GoalOutlook::Possible);
        assert_eq!(GoalOutlook::from_probability(0.1), GoalOutlook::Unlikely);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0.0, 2), "0.00");
        assert_eq!(group_thousands(999.5, 1), "999.5");
        assert_eq!(group_thousands(1234.5, 2), "1,234.50");
        assert_eq!(group_thousands(-1234567.0, 0), "-1,234,567");
        assert_eq!(group_thousands(-0.001, 2), "0.00");
        assert_eq!(group_thousands(100000.0, 0), "100,000");
    }

    #[test]
    fn compact_suffixes() {
        assert_eq!(format_compact(12_345.678), "12,345.68");
        assert_eq!(format_compact(2_500_000.0), "2.50M");
        assert_eq!(format_compact(-3_200_000_000.0), "-3.20B");
        assert_eq!(format_compact(1_500_000_000_000.0), "1,500.00B");
    }

    #[test]
    fn statistics_block_lists_every_figure() {
        let results = analyze(&[1000.0, 2000.0, 3000.0, 4000.0, 5000.0]).unwrap();
        let text = StatisticsBlock(&results).to_string();
        assert!(text.contains("(5 trials)"));
        assert!(text.contains("3,000.0000"));
        assert!(text.contains("p97.5"));
        assert!(text.contains("95% interval: [1,100.0000  -  4,900.0000]"));
    }

    #[test]
    fn goal_line_includes_outlook() {
        let results = analyze(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let goal = results.goal_probability(2.0).unwrap();
        let line = goal_line(2.0, &goal);
        assert!(line.contains("percentile 25.00"));
        assert!(line.contains("75.00%"));
        assert!(line.ends_with("(likely)"));
    }
}
