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

use super::ChordSystem;

/// Score weight per matched chord tone.
const SIZE_WEIGHT: i64 = 100;

/// Score penalty per inversion step.
const INVERSION_PENALTY: i64 = 10;

/// Score bonus when the lowest sounding note belongs to the chord.
const BASS_BONUS: i64 = 5;

/// A chord found among the active notes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChordMatch {
    /// Root pitch class.
    pub root: i64,
    pub root_name: String,
    /// The template's label, e.g. `downmajor`.
    pub quality: String,
    pub symbol: Option<String>,
    /// Index of the bass note within the chord spelling. None when the bass is not a chord tone.
    pub inversion: Option<usize>,
    pub bass_name: String,
    /// Leftover notes as interval names above the root.
    pub additions: Vec<String>,
    pub score: i64,
}

/// The result of analyzing a set of active notes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Analysis {
    Silence,
    Note {
        step: i64,
        name: String,
    },
    Interval {
        lower: String,
        upper: String,
        steps: i64,
        name: Option<String>,
    },
    Chord(ChordMatch),
    /// No template matched; the pitch classes from the bass up.
    Notes(Vec<String>),
}

/// Analyzes absolute step numbers (steps above the system's origin, not yet reduced). The lowest
/// step is the bass. Never fails: anything that isn't a recognizable chord is reported as its
/// notes.
pub fn analyze(system: &ChordSystem, steps: &[i64]) -> Analysis {
    let modulus = system.steps();
    let mut sorted = steps.to_vec();
    sorted.sort_unstable();

    // Pitch classes in order of first appearance from the bass up.
    let mut classes: Vec<i64> = Vec::new();
    for step in &sorted {
        let class = step.rem_euclid(modulus);
        if !classes.contains(&class) {
            classes.push(class);
        }
    }

    match classes.as_slice() {
        [] => Analysis::Silence,
        [step] => Analysis::Note {
            step: *step,
            name: system.spell(*step),
        },
        [lower, upper] => {
            let steps = (upper - lower).rem_euclid(modulus);
            Analysis::Interval {
                lower: system.spell(*lower),
                upper: system.spell(*upper),
                steps,
                name: system.interval_name(steps).map(str::to_string),
            }
        }
        _ => match best_match(system, &classes) {
            Some(chord) => Analysis::Chord(chord),
            None => Analysis::Notes(classes.iter().map(|class| system.spell(*class)).collect()),
        },
    }
}

fn best_match(system: &ChordSystem, classes: &[i64]) -> Option<ChordMatch> {
    let modulus = system.steps();
    let bass = classes[0];
    let mut best: Option<ChordMatch> = None;

    for &root in classes {
        let intervals: Vec<i64> = classes
            .iter()
            .map(|class| (class - root).rem_euclid(modulus))
            .collect();
        let bass_interval = (bass - root).rem_euclid(modulus);

        for chord in system.chords() {
            if !chord.pattern.iter().all(|step| intervals.contains(step)) {
                continue;
            }

            let inversion = chord
                .pattern
                .iter()
                .position(|step| *step == bass_interval);
            let pattern_len = chord.pattern.len() as i64;
            let score = SIZE_WEIGHT * pattern_len
                - INVERSION_PENALTY * inversion.map_or(pattern_len, |i| i as i64)
                + if inversion.is_some() { BASS_BONUS } else { 0 };

            if best.as_ref().is_some_and(|best| best.score >= score) {
                continue;
            }

            let additions = intervals
                .iter()
                .filter(|interval| !chord.pattern.contains(interval))
                .map(|interval| {
                    system
                        .interval_name(*interval)
                        .map_or_else(|| interval.to_string(), str::to_string)
                })
                .collect();

            best = Some(ChordMatch {
                root,
                root_name: system.spell(root),
                quality: chord.template.label.clone(),
                symbol: chord.template.symbol.clone(),
                inversion,
                bass_name: system.spell(bass),
                additions,
                score,
            });
        }
    }

    best
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

impl fmt::Display for ChordMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root_name, self.quality)?;
        match self.inversion {
            Some(0) => {}
            Some(inversion) => write!(f, " ({} inv.)", ordinal(inversion))?,
            None => write!(f, " / {}", self.bass_name)?,
        }
        if !self.additions.is_empty() {
            write!(f, " add {}", self.additions.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analysis::Silence => Ok(()),
            Analysis::Note { name, .. } => write!(f, "{}", name),
            Analysis::Interval {
                lower,
                upper,
                steps,
                name,
            } => match name {
                Some(name) => write!(f, "{}-{}: {} ({})", lower, upper, name, steps),
                None => write!(f, "{}-{}: {}", lower, upper, steps),
            },
            Analysis::Chord(chord) => write!(f, "{}", chord),
            Analysis::Notes(names) => write!(f, "{}", names.join(" ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony;

    fn system(name: &str) -> std::sync::Arc<ChordSystem> {
        harmony::system(name).unwrap()
    }

    fn chord(analysis: Analysis) -> ChordMatch {
        match analysis {
            Analysis::Chord(chord) => chord,
            other => panic!("expected a chord, got {:?}", other),
        }
    }

    #[test]
    fn test_silence_and_single_note() {
        let system = system("53edo");
        assert_eq!(analyze(&system, &[]), Analysis::Silence);
        assert_eq!(
            analyze(&system, &[17, 70]),
            Analysis::Note {
                step: 17,
                name: "vE".to_string()
            }
        );
    }

    #[test]
    fn test_interval() {
        let system = system("53edo");
        let analysis = analyze(&system, &[0, 17]);
        assert_eq!(
            analysis,
            Analysis::Interval {
                lower: "C".to_string(),
                upper: "vE".to_string(),
                steps: 17,
                name: Some("vM3".to_string()),
            }
        );
        assert_eq!(analysis.to_string(), "C-vE: vM3 (17)");

        // Measured from the bass, even when the bass is the higher pitch class.
        let analysis = analyze(&system, &[31, 53]);
        assert!(matches!(analysis, Analysis::Interval { steps: 22, .. }));
    }

    #[test]
    fn test_53edo_downmajor_root_position() {
        let system = system("53edo");
        let chord = chord(analyze(&system, &[0, 17, 31]));
        assert_eq!(chord.quality, "downmajor");
        assert_eq!(chord.root_name, "C");
        assert_eq!(chord.inversion, Some(0));
        assert!(chord.additions.is_empty());
        assert_eq!(chord.to_string(), "C downmajor");
    }

    #[test]
    fn test_53edo_downmajor_inversions() {
        let system = system("53edo");

        let first = chord(analyze(&system, &[17, 31, 53]));
        assert_eq!(first.quality, "downmajor");
        assert_eq!(first.root, 0);
        assert_eq!(first.inversion, Some(1));
        assert_eq!(first.to_string(), "C downmajor (1st inv.)");

        let second = chord(analyze(&system, &[31, 53, 70]));
        assert_eq!(second.inversion, Some(2));
        assert_eq!(second.bass_name, "G");
    }

    #[test]
    fn test_53edo_pythagorean_major() {
        let system = system("53edo");
        let chord = chord(analyze(&system, &[9, 27, 40]));
        assert_eq!(chord.quality, "Pythagorean major");
        assert_eq!(chord.root_name, "D");
        assert_eq!(chord.inversion, Some(0));
    }

    #[test]
    fn test_larger_chord_wins() {
        let system = system("53edo");
        let chord = chord(analyze(&system, &[0, 17, 31, 43]));
        assert_eq!(chord.quality, "harmonic seventh");
        assert!(chord.additions.is_empty());
    }

    #[test]
    fn test_additions() {
        let system = system("12edo");
        let chord = chord(analyze(&system, &[0, 4, 7, 14]));
        assert_eq!(chord.quality, "major");
        assert_eq!(chord.additions, vec!["M2".to_string()]);
        assert_eq!(chord.to_string(), "C major add M2");
    }

    #[test]
    fn test_root_position_beats_inversion() {
        // C6 and Am7 share pitch classes; with A in the bass the minor seventh reading wins.
        let system = system("12edo");
        let chord = chord(analyze(&system, &[9, 12, 16, 19]));
        assert_eq!(chord.quality, "minor seventh");
        assert_eq!(chord.root_name, "A");
        assert_eq!(chord.inversion, Some(0));
    }

    #[test]
    fn test_foreign_bass() {
        let system = system("12edo");
        let chord = chord(analyze(&system, &[6, 12, 16, 19]));
        assert_eq!(chord.quality, "major");
        assert_eq!(chord.inversion, None);
        assert_eq!(chord.to_string(), "C major / F# add A4");
    }

    #[test]
    fn test_no_match_reports_notes() {
        let system = system("12edo");
        let analysis = analyze(&system, &[0, 1, 2]);
        assert_eq!(
            analysis,
            Analysis::Notes(vec!["C".to_string(), "C#".to_string(), "D".to_string()])
        );
        assert_eq!(analysis.to_string(), "C C# D");
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
    }
}
