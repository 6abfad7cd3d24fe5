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

//! A looping ambient pad: per-note layered samples, overlap-add looping and crossfaded note
//! changes over a small in-process audio graph.

pub mod audio;
pub mod config;
pub mod controller;
pub mod notes;
pub mod pad;
pub mod params;
pub mod presets;
pub mod samples;
#[cfg(test)]
mod testutil;
