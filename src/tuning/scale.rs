// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use tracing::{debug, warn};

use super::{ratio_to_cents, DEFAULT_EQUIVALENCE};

/// A scale: cents offsets of each degree within one equivalence interval. The first degree is
/// always 0 and the degrees are strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct Scale {
    degrees: Vec<f64>,
    equivalence: f64,
}

impl Scale {
    /// Parses a line-oriented scale definition. Each line holds either a ratio (`3/2`, or a bare
    /// integer `2` meaning `2/1`) or a cents value containing a decimal point (`701.955`). Blank
    /// lines and lines starting with `!` or `#` are skipped, as is anything after the first
    /// token. The last valid entry is the equivalence interval. Never fails: unusable input
    /// yields the single-degree default scale.
    pub fn parse(text: &str) -> Scale {
        let mut values = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with('#') {
                continue;
            }
            match parse_entry(main_item(trimmed)) {
                Some(cents) => values.push(cents),
                None => debug!(line = line_number + 1, entry = trimmed, "Skipping invalid scale entry."),
            }
        }

        let Some(equivalence) = values.pop() else {
            warn!("Scale definition has no valid entries, using default scale.");
            return Scale::default();
        };
        Scale::from_cents(values, equivalence)
    }

    /// Builds a scale from degree cents and an equivalence interval. Degrees outside
    /// `[0, equivalence)` are dropped, the rest are sorted and deduplicated and a 0 degree is
    /// always present.
    pub fn from_cents(degrees: impl IntoIterator<Item = f64>, equivalence: f64) -> Scale {
        if !equivalence.is_finite() || equivalence <= 0.0 {
            warn!(equivalence, "Equivalence interval must be positive, using default scale.");
            return Scale::default();
        }

        let mut degrees: Vec<f64> = std::iter::once(0.0)
            .chain(
                degrees
                    .into_iter()
                    .filter(|cents| (0.0..equivalence).contains(cents)),
            )
            .collect();
        degrees.sort_by(f64::total_cmp);
        degrees.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        Scale {
            degrees,
            equivalence,
        }
    }

    /// Creates an equal division of the given equivalence interval.
    pub fn equal(steps: u16, equivalence: f64) -> Scale {
        let steps = steps.max(1);
        let step = equivalence / steps as f64;
        Scale::from_cents((1..steps).map(|i| i as f64 * step), equivalence)
    }

    /// Returns the degrees in cents.
    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    /// Returns the cents of a degree. Out of range degrees wrap.
    pub fn degree(&self, index: usize) -> f64 {
        self.degrees[index % self.degrees.len()]
    }

    /// Returns the equivalence interval in cents.
    pub fn equivalence(&self) -> f64 {
        self.equivalence
    }

    /// Returns the number of degrees per equivalence interval. Never zero.
    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale {
            degrees: vec![0.0],
            equivalence: DEFAULT_EQUIVALENCE,
        }
    }
}

impl fmt::Display for Scale {
    /// Writes the scale back out in the format `parse` reads.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for degree in &self.degrees {
            writeln!(f, "{:.6}", degree)?;
        }
        write!(f, "{:.6}", self.equivalence)
    }
}

fn main_item(line: &str) -> &str {
    line.split_ascii_whitespace().next().unwrap_or("")
}

fn parse_entry(item: &str) -> Option<f64> {
    let cents = if item.contains('.') {
        item.parse::<f64>().ok()?
    } else if let Some((numer, denom)) = item.split_once('/') {
        ratio(numer.parse().ok()?, denom.parse().ok()?)?
    } else {
        ratio(item.parse().ok()?, 1.0)?
    };
    cents.is_finite().then_some(cents)
}

fn ratio(numer: f64, denom: f64) -> Option<f64> {
    (numer > 0.0 && denom > 0.0).then(|| ratio_to_cents(numer / denom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cents() {
        let scale = Scale::parse("0.0\n100.0\n200.0\n1200.0");
        assert_eq!(scale.degrees(), &[0.0, 100.0, 200.0]);
        assert_eq!(scale.equivalence(), 1200.0);
        assert_eq!(scale.len(), 3);
    }

    #[test]
    fn test_parse_ratios_and_comments() {
        let scale = Scale::parse(
            "! just major triad\n\n# comment\n5/4 major third\n3/2\n2\n",
        );
        assert_eq!(scale.len(), 3);
        assert!((scale.degrees()[1] - 386.3137).abs() < 1e-3);
        assert!((scale.degrees()[2] - 701.955).abs() < 1e-3);
        assert!((scale.equivalence() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_sorts_and_dedups() {
        let scale = Scale::parse("700.0\n200.0\n700.0\n-50.0\n1300.0\n1200.0");
        assert_eq!(scale.degrees(), &[0.0, 200.0, 700.0]);
    }

    #[test]
    fn test_parse_tritave() {
        let scale = Scale::parse("3/1");
        assert_eq!(scale.degrees(), &[0.0]);
        assert!((scale.equivalence() - 1901.955).abs() < 1e-3);
    }

    #[test]
    fn test_parse_garbage_falls_back() {
        assert_eq!(Scale::parse(""), Scale::default());
        assert_eq!(Scale::parse("hello\nworld\n3/0\n0/5"), Scale::default());
        assert_eq!(Scale::parse("100.0\n-1200.0"), Scale::default());

        let scale = Scale::default();
        assert_eq!(scale.degrees(), &[0.0]);
        assert_eq!(scale.equivalence(), DEFAULT_EQUIVALENCE);
    }

    #[test]
    fn test_equal_division() {
        let scale = Scale::equal(31, 1200.0);
        assert_eq!(scale.len(), 31);
        assert!((scale.degree(1) - 1200.0 / 31.0).abs() < 1e-9);
        assert_eq!(Scale::equal(0, 1200.0).len(), 1);
    }

    #[test]
    fn test_display_parses_back() {
        let scale = Scale::equal(12, 1200.0);
        let reparsed = Scale::parse(&scale.to_string());
        assert_eq!(reparsed.len(), 12);
        assert!((reparsed.degree(7) - 700.0).abs() < 1e-6);
    }
}
