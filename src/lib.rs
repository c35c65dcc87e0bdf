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
//! An isomorphic microtonal keyboard engine.
//!
//! Grid coordinates resolve to pitches through the [tuning] model. The [notes] manager turns
//! note intents into MIDI messages or pitched sample voices drawn from the [samples] cache and
//! tracked by the [audio::pool]. The sounding notes are analyzed by [harmony].
pub mod audio;
pub mod config;
pub mod controller;
pub mod harmony;
pub mod midi;
pub mod notes;
pub mod playsync;
pub mod samples;
#[cfg(test)]
pub mod testutil;
pub mod tuning;
