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

//! Remote sample ids per note and the advisory availability reports about them.
//!
//! Availability reports come from an external, best-effort checker. Nothing here is
//! consulted for playback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::notes::Note;

/// Optional remote file ids configured per note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleSources {
    ids: BTreeMap<Note, Option<String>>,
}

impl SampleSources {
    pub fn set(&mut self, note: Note, id: Option<String>) {
        let id = id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
        self.ids.insert(note, id);
    }

    pub fn get(&self, note: Note) -> Option<&str> {
        self.ids.get(&note).and_then(|id| id.as_deref())
    }

    /// Builds the request for the availability checker, in note order.
    pub fn availability_request(&self) -> AvailabilityRequest {
        AvailabilityRequest {
            file_ids: self
                .ids
                .values()
                .filter_map(|id| id.clone())
                .collect(),
        }
    }

    pub fn from_json(document: &str) -> Result<SampleSources, serde_json::Error> {
        serde_json::from_str(document)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The ids to ask the availability checker about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub file_ids: Vec<String>,
}

/// One advisory answer from the availability checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub file_id: String,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_availability_request() {
        let mut sources = SampleSources::default();
        sources.set(Note::G, Some("g-id".to_string()));
        sources.set(Note::C, Some(" c-id ".to_string()));
        sources.set(Note::D, Some("".to_string()));
        sources.set(Note::E, None);

        assert_eq!(Some("c-id"), sources.get(Note::C));
        assert_eq!(None, sources.get(Note::D));
        assert_eq!(
            vec!["c-id".to_string(), "g-id".to_string()],
            sources.availability_request().file_ids
        );
    }

    #[test]
    fn test_json() -> Result<(), serde_json::Error> {
        let sources = SampleSources::from_json(r#"{"C#": "abc", "Eb": null}"#)?;
        assert_eq!(Some("abc"), sources.get(Note::CSharp));
        assert_eq!(None, sources.get(Note::EFlat));
        assert_eq!(sources, SampleSources::from_json(&sources.to_json()?)?);

        let report: AvailabilityReport = serde_json::from_str(
            r#"{"fileId": "abc", "isAvailable": false, "errorMessage": "gone"}"#,
        )?;
        assert!(!report.is_available);
        assert_eq!(Some("gone".to_string()), report.error_message);
        Ok(())
    }
}
