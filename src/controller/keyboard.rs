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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use crate::tuning::Coord;

use super::Event;

const ON: &str = "on";
const OFF: &str = "off";
const SUSTAIN: &str = "sustain";
const VOLUME: &str = "volume";
const INSTRUMENT: &str = "instrument";
const OCTAVE: &str = "octave";
const PANIC: &str = "panic";

/// A driver that reads commands from standard input, one per line.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads one command. Returns false once the input is exhausted.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} r ur, {} r ur, {} on|off, {} x, {} name, {} n, {}): ",
            ON, OFF, SUSTAIN, VOLUME, INSTRUMENT, OCTAVE, PANIC,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match parse_command(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

/// Parses a command line such as `on 1 -2` or `sustain off`.
pub fn parse_command(input: &str) -> Option<Event> {
    let mut words = input.split_whitespace();
    let command = words.next()?.to_lowercase();
    let args = words.collect::<Vec<&str>>();

    let coord = |args: &[&str]| match args {
        [r, ur] => Some(Coord::new(r.parse().ok()?, ur.parse().ok()?)),
        _ => None,
    };

    match (command.as_str(), args.as_slice()) {
        (ON, args) => coord(args).map(Event::NoteOn),
        (OFF, args) => coord(args).map(Event::NoteOff),
        (SUSTAIN, ["on"]) => Some(Event::Sustain(true)),
        (SUSTAIN, ["off"]) => Some(Event::Sustain(false)),
        (VOLUME, [value]) => value.parse().ok().map(Event::Volume),
        (INSTRUMENT, [name]) => Some(Event::Instrument(name.to_string())),
        (OCTAVE, [octaves]) => octaves.parse().ok().map(Event::Octave),
        (PANIC, []) => Some(Event::Panic),
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader};

    use tokio::sync::mpsc;

    use crate::{controller::Event, tuning::Coord};

    use super::{parse_command, Driver};

    fn get_event(input: &str) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());
        let mut writer: Vec<u8> = Vec::new();
        let more = Driver::monitor_io(&sender, reader, &mut writer)?;
        assert!(String::from_utf8_lossy(&writer).starts_with("Command ("));

        // Force the sender to close.
        drop(sender);
        Ok((more, receiver.blocking_recv()))
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(
            (true, Some(Event::NoteOn(Coord::new(1, -2)))),
            get_event("on 1 -2\n")?
        );
        assert_eq!((true, Some(Event::Panic)), get_event("PANIC\n")?);
        assert_eq!((true, None), get_event("unrecognized\n")?);
        assert_eq!((false, None), get_event("")?);
        Ok(())
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(Some(Event::NoteOff(Coord::new(0, 3))), parse_command("off 0 3"));
        assert_eq!(Some(Event::Sustain(true)), parse_command("sustain on"));
        assert_eq!(Some(Event::Sustain(false)), parse_command("  sustain   off "));
        assert_eq!(Some(Event::Volume(0.5)), parse_command("volume 0.5"));
        assert_eq!(
            Some(Event::Instrument("rhodes".to_string())),
            parse_command("instrument rhodes")
        );
        assert_eq!(Some(Event::Octave(-1)), parse_command("octave -1"));

        assert_eq!(None, parse_command(""));
        assert_eq!(None, parse_command("on 1"));
        assert_eq!(None, parse_command("on a b"));
        assert_eq!(None, parse_command("sustain maybe"));
        assert_eq!(None, parse_command("volume loud"));
        assert_eq!(None, parse_command("panic now"));
    }
}
