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
use std::{collections::BTreeMap, fmt};

use serde::Deserialize;
use tracing::warn;

/// Where a modifier is written relative to the note letter.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Prefix,
    #[default]
    Suffix,
}

/// An accidental: a symbol that shifts a natural by a number of steps.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Modifier {
    pub symbol: String,
    pub steps: i64,
    #[serde(default)]
    pub position: Position,
}

/// A chord spelled from note names, e.g. `[C, vE, G]`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ChordTemplate {
    pub label: String,
    pub notes: Vec<String>,
    pub symbol: Option<String>,
}

/// The YAML shape of a chord system table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Table {
    name: String,
    steps: i64,
    naturals: BTreeMap<String, i64>,
    #[serde(default)]
    modifiers: Vec<Modifier>,
    #[serde(default)]
    intervals: BTreeMap<i64, Vec<String>>,
    #[serde(default)]
    chords: Vec<ChordTemplate>,
}

/// A compiled chord template: its spelling plus the interval pattern relative to its first note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledChord {
    pub template: ChordTemplate,
    pub pattern: Vec<i64>,
}

/// A tuning system's naming and chord-spelling data: natural note steps, modifiers, an interval
/// dictionary and chord templates.
#[derive(Clone, Debug)]
pub struct ChordSystem {
    name: String,
    steps: i64,
    /// Naturals ordered by step.
    naturals: Vec<(char, i64)>,
    modifiers: Vec<Modifier>,
    intervals: BTreeMap<i64, Vec<String>>,
    chords: Vec<CompiledChord>,
}

impl ChordSystem {
    /// Parses a chord system from YAML. Templates with unresolvable notes are dropped with a
    /// warning rather than failing the whole table.
    pub fn from_yaml(yaml: &str) -> Result<ChordSystem, serde_yml::Error> {
        let table: Table = serde_yml::from_str(yaml)?;
        Ok(ChordSystem::from_table(table))
    }

    fn from_table(table: Table) -> ChordSystem {
        let steps = table.steps.max(1);
        let mut naturals: Vec<(char, i64)> = table
            .naturals
            .iter()
            .filter_map(|(name, step)| {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter @ 'A'..='G'), None) => Some((letter, step.rem_euclid(steps))),
                    _ => {
                        warn!(system = table.name, natural = name, "Ignoring invalid natural.");
                        None
                    }
                }
            })
            .collect();
        naturals.sort_by_key(|(letter, step)| (*step, *letter));

        // Longest symbols first so tokenizing is greedy.
        let mut modifiers = table.modifiers;
        modifiers.sort_by_key(|modifier| std::cmp::Reverse(modifier.symbol.len()));

        let mut system = ChordSystem {
            name: table.name,
            steps,
            naturals,
            modifiers,
            intervals: table
                .intervals
                .into_iter()
                .map(|(interval, names)| (interval.rem_euclid(steps), names))
                .collect(),
            chords: Vec::new(),
        };

        system.chords = table
            .chords
            .into_iter()
            .filter_map(|template| match system.pattern(&template.notes) {
                Some(pattern) => Some(CompiledChord { template, pattern }),
                None => {
                    warn!(
                        system = system.name,
                        chord = template.label,
                        "Chord template has unresolvable notes, skipping."
                    );
                    None
                }
            })
            .collect();
        system
    }

    /// Returns the name of the system.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps per equivalence interval.
    pub fn steps(&self) -> i64 {
        self.steps
    }

    /// Returns the compiled chord templates in table order.
    pub fn chords(&self) -> &[CompiledChord] {
        &self.chords
    }

    /// Resolves a note name such as `vE`, `Bb` or `^^F#` to a step within the system. The first
    /// letter A-G is the natural; everything before and after it must tokenize into known
    /// modifiers, whose deltas are summed.
    pub fn note_step(&self, name: &str) -> Option<i64> {
        let (index, letter) = name.char_indices().find(|(_, c)| matches!(c, 'A'..='G'))?;
        let natural = self
            .naturals
            .iter()
            .find(|(candidate, _)| *candidate == letter)
            .map(|(_, step)| *step)?;

        let prefix = &name[..index];
        let suffix = &name[index + letter.len_utf8()..];
        let delta = self.modifier_delta(prefix)? + self.modifier_delta(suffix)?;
        Some((natural + delta).rem_euclid(self.steps))
    }

    fn modifier_delta(&self, mut text: &str) -> Option<i64> {
        let mut delta = 0;
        while !text.is_empty() {
            let modifier = self
                .modifiers
                .iter()
                .find(|modifier| !modifier.symbol.is_empty() && text.starts_with(&modifier.symbol))?;
            delta += modifier.steps;
            text = &text[modifier.symbol.len()..];
        }
        Some(delta)
    }

    /// Converts a spelled chord into intervals relative to its first note.
    pub fn pattern<S: AsRef<str>>(&self, notes: &[S]) -> Option<Vec<i64>> {
        let steps: Vec<i64> = notes
            .iter()
            .map(|note| self.note_step(note.as_ref()))
            .collect::<Option<_>>()?;
        let root = *steps.first()?;
        Some(
            steps
                .iter()
                .map(|step| (step - root).rem_euclid(self.steps))
                .collect(),
        )
    }

    /// Spells a step: a natural if possible, then a natural with one modifier, then with two.
    /// Among spellings with the same number of modifiers the smallest total alteration wins.
    /// Falls back to the bare step number.
    pub fn spell(&self, step: i64) -> String {
        let step = step.rem_euclid(self.steps);
        if let Some((letter, _)) = self.naturals.iter().find(|(_, s)| *s == step) {
            return letter.to_string();
        }

        let single = self
            .naturals
            .iter()
            .flat_map(|natural| self.modifiers.iter().map(move |m| (natural, vec![m])));
        if let Some(name) = self.best_spelling(step, single) {
            return name;
        }

        let double = self.naturals.iter().flat_map(|natural| {
            self.modifiers.iter().flat_map(move |first| {
                self.modifiers
                    .iter()
                    .map(move |second| (natural, vec![first, second]))
            })
        });
        if let Some(name) = self.best_spelling(step, double) {
            return name;
        }

        step.to_string()
    }

    fn best_spelling<'a>(
        &self,
        step: i64,
        candidates: impl Iterator<Item = (&'a (char, i64), Vec<&'a Modifier>)>,
    ) -> Option<String> {
        candidates
            .filter(|((_, natural), modifiers)| {
                let delta: i64 = modifiers.iter().map(|m| m.steps).sum();
                (natural + delta).rem_euclid(self.steps) == step
            })
            .min_by_key(|(_, modifiers)| modifiers.iter().map(|m| m.steps.abs()).sum::<i64>())
            .map(|((letter, _), modifiers)| spelled(*letter, &modifiers))
    }

    /// Returns the first name the interval dictionary has for a step count.
    pub fn interval_name(&self, steps: i64) -> Option<&str> {
        self.intervals
            .get(&steps.rem_euclid(self.steps))
            .and_then(|names| names.first())
            .map(String::as_str)
    }

    /// Converts cents to the nearest absolute step of this system, given the equivalence
    /// interval the cents are measured against.
    pub fn step_for_cents(&self, cents: f64, equivalence: f64) -> i64 {
        if equivalence <= 0.0 {
            return 0;
        }
        (cents * self.steps as f64 / equivalence).round() as i64
    }
}

impl fmt::Display for ChordSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} steps, {} chords)",
            self.name,
            self.steps,
            self.chords.len()
        )
    }
}

fn spelled(letter: char, modifiers: &[&Modifier]) -> String {
    let mut name = String::new();
    for modifier in modifiers.iter().filter(|m| m.position == Position::Prefix) {
        name.push_str(&modifier.symbol);
    }
    name.push(letter);
    for modifier in modifiers.iter().filter(|m| m.position == Position::Suffix) {
        name.push_str(&modifier.symbol);
    }
    name
}
