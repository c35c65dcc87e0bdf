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
//! The tuning model: scales, grid coordinates and pitch resolution. Everything here is pure.

mod pitch;
mod scale;

pub use pitch::{
    resolve_pitch, Coord, Pitch, TuningConfig, DEFAULT_CENTER_MIDI_NOTE, DEFAULT_FUNDAMENTAL,
};
pub use scale::Scale;

/// The equivalence interval used when a scale doesn't provide a usable one.
pub const DEFAULT_EQUIVALENCE: f64 = 1200.0;

/// Converts a frequency ratio to cents.
pub fn ratio_to_cents(ratio: f64) -> f64 {
    1200.0 * ratio.log2()
}

/// Converts cents to a frequency ratio.
pub fn cents_to_ratio(cents: f64) -> f64 {
    (cents / 1200.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_conversions() {
        assert!((ratio_to_cents(2.0) - 1200.0).abs() < 1e-9);
        assert!((ratio_to_cents(3.0 / 2.0) - 701.955).abs() < 1e-3);
        assert!((cents_to_ratio(-1200.0) - 0.5).abs() < 1e-12);
    }
}
