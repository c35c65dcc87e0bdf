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
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::{
    harmony::{self, ChordSystem},
    tuning::Scale,
};

/// Disables chord recognition.
const NONE: &str = "none";

/// A YAML representation of chord recognition.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Harmony {
    /// The chord system name, e.g. 53edo, or "none". Picked from the scale when unset.
    system: Option<String>,
}

impl Harmony {
    pub fn new(system: &str) -> Harmony {
        Harmony {
            system: Some(system.to_string()),
        }
    }

    /// Returns the chord system to analyze with. An unknown name disables recognition rather than
    /// failing.
    pub fn system(&self, scale: &Scale) -> Option<Arc<ChordSystem>> {
        match self.system.as_deref() {
            Some(name) if name.eq_ignore_ascii_case(NONE) => None,
            Some(name) => {
                let system = harmony::system(name);
                if system.is_none() {
                    warn!(system = name, "Unknown chord system, chord recognition is off.");
                }
                system
            }
            None => harmony::system_for_scale(scale),
        }
    }
}
