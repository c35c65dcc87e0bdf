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
//! Built-in chord system tables.

use std::sync::{Arc, OnceLock};

use tracing::error;

use super::ChordSystem;

const EDO12: &str = r##"
name: 12edo
steps: 12
naturals: { C: 0, D: 2, E: 4, F: 5, G: 7, A: 9, B: 11 }
modifiers:
  - { symbol: "#", steps: 1 }
  - { symbol: "b", steps: -1 }
intervals:
  0: [P1, unison]
  1: [m2, minor second]
  2: [M2, major second]
  3: [m3, minor third]
  4: [M3, major third]
  5: [P4, perfect fourth]
  6: [A4, tritone]
  7: [P5, perfect fifth]
  8: [m6, minor sixth]
  9: [M6, major sixth]
  10: [m7, minor seventh]
  11: [M7, major seventh]
chords:
  - { label: major, notes: [C, E, G], symbol: "" }
  - { label: minor, notes: [C, Eb, G], symbol: m }
  - { label: diminished, notes: [C, Eb, Gb], symbol: dim }
  - { label: augmented, notes: [C, E, G#], symbol: aug }
  - { label: suspended fourth, notes: [C, F, G], symbol: sus4 }
  - { label: suspended second, notes: [C, D, G], symbol: sus2 }
  - { label: dominant seventh, notes: [C, E, G, Bb], symbol: "7" }
  - { label: major seventh, notes: [C, E, G, B], symbol: maj7 }
  - { label: minor seventh, notes: [C, Eb, G, Bb], symbol: m7 }
  - { label: half-diminished seventh, notes: [C, Eb, Gb, Bb], symbol: m7b5 }
  - { label: diminished seventh, notes: [C, Eb, Gb, Bbb], symbol: dim7 }
"##;

const EDO31: &str = r##"
name: 31edo
steps: 31
naturals: { C: 0, D: 5, E: 10, F: 13, G: 18, A: 23, B: 28 }
modifiers:
  - { symbol: "#", steps: 2 }
  - { symbol: "b", steps: -2 }
  - { symbol: "^", steps: 1, position: prefix }
  - { symbol: "v", steps: -1, position: prefix }
intervals:
  0: [P1, unison]
  1: [^1, diesis]
  2: [A1, chromatic semitone]
  3: [m2, diatonic semitone]
  4: [^m2, neutral second]
  5: [M2, major second]
  6: [^M2, supermajor second]
  7: [vm3, subminor third]
  8: [m3, minor third]
  9: [^m3, neutral third]
  10: [M3, major third]
  11: [^M3, supermajor third]
  12: [v4, sub fourth]
  13: [P4, perfect fourth]
  14: [^4, super fourth]
  15: [A4, augmented fourth]
  16: [d5, diminished fifth]
  17: [v5, sub fifth]
  18: [P5, perfect fifth]
  19: [^5, super fifth]
  20: [A5, augmented fifth]
  21: [m6, minor sixth]
  22: [^m6, neutral sixth]
  23: [M6, major sixth]
  24: [^M6, supermajor sixth]
  25: [vm7, harmonic seventh]
  26: [m7, minor seventh]
  27: [^m7, neutral seventh]
  28: [M7, major seventh]
  29: [^M7, supermajor seventh]
  30: [v8, sub octave]
chords:
  - { label: major, notes: [C, E, G], symbol: "" }
  - { label: minor, notes: [C, Eb, G], symbol: m }
  - { label: subminor, notes: [C, vEb, G], symbol: vm }
  - { label: supermajor, notes: [C, ^E, G], symbol: ^ }
  - { label: diminished, notes: [C, Eb, Gb], symbol: dim }
  - { label: augmented, notes: [C, E, G#], symbol: aug }
  - { label: suspended fourth, notes: [C, F, G], symbol: sus4 }
  - { label: suspended second, notes: [C, D, G], symbol: sus2 }
  - { label: harmonic seventh, notes: [C, E, G, A#], symbol: h7 }
  - { label: dominant seventh, notes: [C, E, G, Bb], symbol: "7" }
  - { label: major seventh, notes: [C, E, G, B], symbol: maj7 }
  - { label: minor seventh, notes: [C, Eb, G, Bb], symbol: m7 }
"##;

const EDO53: &str = r##"
name: 53edo
steps: 53
naturals: { C: 0, D: 9, E: 18, F: 22, G: 31, A: 40, B: 49 }
modifiers:
  - { symbol: "#", steps: 5 }
  - { symbol: "b", steps: -5 }
  - { symbol: "^", steps: 1, position: prefix }
  - { symbol: "v", steps: -1, position: prefix }
intervals:
  0: [P1, unison]
  1: [^1, comma]
  2: [^^1, double comma]
  3: [vm2, downminor second]
  4: [m2, minor second]
  5: [^m2, upminor second]
  6: [^^m2, double-upminor second]
  7: [vvM2, double-downmajor second]
  8: [vM2, downmajor second]
  9: [M2, major second]
  10: [^M2, upmajor second]
  11: [^^M2, double-upmajor second]
  12: [vm3, downminor third]
  13: [m3, minor third]
  14: [^m3, upminor third]
  15: [^^m3, double-upminor third]
  16: [vvM3, double-downmajor third]
  17: [vM3, downmajor third]
  18: [M3, major third]
  19: [^M3, upmajor third]
  20: [^^M3, double-upmajor third]
  21: [v4, down fourth]
  22: [P4, perfect fourth]
  23: [^4, up fourth]
  24: [^^4, double-up fourth]
  25: [vd5, downdiminished fifth]
  26: [d5, diminished fifth]
  27: [A4, augmented fourth]
  28: [^A4, upaugmented fourth]
  29: [vv5, double-down fifth]
  30: [v5, down fifth]
  31: [P5, perfect fifth]
  32: [^5, up fifth]
  33: [^^5, double-up fifth]
  34: [vm6, downminor sixth]
  35: [m6, minor sixth]
  36: [^m6, upminor sixth]
  37: [^^m6, double-upminor sixth]
  38: [vvM6, double-downmajor sixth]
  39: [vM6, downmajor sixth]
  40: [M6, major sixth]
  41: [^M6, upmajor sixth]
  42: [^^M6, double-upmajor sixth]
  43: [vm7, harmonic seventh]
  44: [m7, minor seventh]
  45: [^m7, upminor seventh]
  46: [^^m7, double-upminor seventh]
  47: [vvM7, double-downmajor seventh]
  48: [vM7, downmajor seventh]
  49: [M7, major seventh]
  50: [^M7, upmajor seventh]
  51: [^^M7, double-upmajor seventh]
  52: [v8, down octave]
chords:
  - { label: downmajor, notes: [C, vE, G], symbol: v }
  - { label: Pythagorean major, notes: [C, E, G], symbol: "" }
  - { label: upminor, notes: [C, ^Eb, G], symbol: ^m }
  - { label: Pythagorean minor, notes: [C, Eb, G], symbol: m }
  - { label: suspended fourth, notes: [C, F, G], symbol: sus4 }
  - { label: suspended second, notes: [C, D, G], symbol: sus2 }
  - { label: harmonic seventh, notes: [C, vE, G, vBb], symbol: v7 }
  - { label: downmajor seventh, notes: [C, vE, G, vB], symbol: vmaj7 }
  - { label: upminor seventh, notes: [C, ^Eb, G, ^Bb], symbol: ^m7 }
"##;

/// Returns the built-in systems. A table that fails to parse is logged and left out.
pub fn builtin() -> &'static [Arc<ChordSystem>] {
    static SYSTEMS: OnceLock<Vec<Arc<ChordSystem>>> = OnceLock::new();
    SYSTEMS.get_or_init(|| {
        [EDO12, EDO31, EDO53]
            .into_iter()
            .filter_map(|yaml| match ChordSystem::from_yaml(yaml) {
                Ok(system) => Some(Arc::new(system)),
                Err(e) => {
                    error!(err = %e, "Unable to parse built-in chord system.");
                    None
                }
            })
            .collect()
    })
}
