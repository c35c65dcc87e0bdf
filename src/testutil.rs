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
//! Helpers shared by tests.
use std::{error::Error, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::samples::PitchBucket;

mod polling;

pub use polling::{eventually, eventually_async};

/// Writes a short mono sine wave for every pitch bucket of an instrument, named the way a
/// directory source looks them up.
pub fn write_instrument(
    directory: &Path,
    instrument: &str,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    for bucket in PitchBucket::ALL {
        let path = directory.join(format!("{}.wav", bucket.asset_name(instrument)));
        let mut writer = WavWriter::new(
            File::create(path)?,
            WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;

        let frames = sample_rate as usize / 10;
        for frame in 0..frames {
            let t = frame as f64 / sample_rate as f64;
            let value = (2.0 * std::f64::consts::PI * bucket.base_frequency() * t).sin();
            writer.write_sample((value * i16::MAX as f64 * 0.5) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(())
}
