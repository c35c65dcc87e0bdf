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
//! Harmonic analysis over arbitrary equal divisions: chord system tables, note naming and chord
//! recognition.

use std::sync::Arc;

mod chord;
mod system;
mod tables;

pub use chord::{analyze, Analysis, ChordMatch};
pub use system::{ChordSystem, ChordTemplate, CompiledChord, Modifier, Position};

use crate::tuning::Scale;

/// Returns the built-in chord system with the given name.
pub fn system(name: &str) -> Option<Arc<ChordSystem>> {
    tables::builtin()
        .iter()
        .find(|system| system.name().eq_ignore_ascii_case(name))
        .cloned()
}

/// Returns the built-in systems.
pub fn systems() -> &'static [Arc<ChordSystem>] {
    tables::builtin()
}

/// Picks the built-in system matching an equal-tempered octave scale of the same size.
pub fn system_for_scale(scale: &Scale) -> Option<Arc<ChordSystem>> {
    if (scale.equivalence() - 1200.0).abs() > 1.0 {
        return None;
    }
    tables::builtin()
        .iter()
        .find(|system| system.steps() == scale.len() as i64)
        .cloned()
}
